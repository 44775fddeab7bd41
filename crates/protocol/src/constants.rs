use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the base real-time endpoint.
pub const ENDPOINT_ENV: &str = "BIZOSAAS_WS_URL";

/// Base endpoint used when [`ENDPOINT_ENV`] is not set.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/realtime";

/// Delay unit for linear reconnect backoff (attempt N waits N units).
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Automatic reconnect attempts before the client gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Frames kept while disconnected, flushed on the next open.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// How long a handshake may take before it counts as a close.
pub const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to write one WebSocket frame.
pub const WS_WRITE_WAIT: Duration = Duration::from_secs(10);

/// How often to send keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(25);

/// Read deadline: if nothing arrives within this window the
/// connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Maximum inbound message size in bytes (16 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Server push: dashboard metrics refresh.
pub const MSG_METRICS_UPDATE: &str = "metrics_update";

/// Server push: AI agent status change.
pub const MSG_AGENT_STATUS: &str = "agent_status";

/// Control message types sent by dashboards.
///
/// These are conventions shared with the gateway, not a versioned
/// protocol. Serialized with the variant name in the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Ask the gateway to start streaming dashboard data.
    DashboardConnect,
    /// Ask the gateway to start streaming agent activity.
    AgentMonitorConnect,
    /// Ask for an immediate refresh of one update stream.
    RequestUpdate { update_type: String },
}

impl ControlMessage {
    /// Returns the wire `type` string of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::DashboardConnect => "dashboard_connect",
            Self::AgentMonitorConnect => "agent_monitor_connect",
            Self::RequestUpdate { .. } => "request_update",
        }
    }
}
