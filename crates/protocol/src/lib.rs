pub mod constants;
pub mod endpoint;
pub mod envelope;

// Re-export primary types for convenience.
pub use constants::ControlMessage;
pub use endpoint::endpoint_url;
pub use envelope::{InboundMessage, ProtocolError, stamp_outbound};
