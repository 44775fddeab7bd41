//! Real-time client for BizOSaaS dashboards.
//!
//! Keeps one WebSocket per tenant and user, reconnects with linear backoff
//! and fans server pushes out to per-type listeners.

pub mod binding;
pub mod config;
pub(crate) mod dispatch;
pub mod error;
pub mod manager;
pub(crate) mod outbound;
pub mod pool;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod registry;
pub mod types;
pub mod ws_client;

#[cfg(test)]
pub(crate) mod test_support;

pub use binding::RealtimeBinding;
pub use config::{ConfigError, RealtimeConfig};
pub use error::RealtimeError;
pub use manager::ConnectionManager;
pub use pool::{ConnectionKey, ConnectionLease, ConnectionPool};
pub use registry::{Subscription, SubscriptionBag, SubscriptionRegistry};
pub use types::{ConnectionEvent, ConnectionState, ReconnectConfig, SendOutcome};
pub use ws_client::WsError;
