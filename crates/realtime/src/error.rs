use bizosaas_protocol::ProtocolError;

use crate::config::ConfigError;

/// Errors from building connections, bindings and configuration.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
