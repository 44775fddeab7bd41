//! Public types for the real-time connection manager.

use std::time::Duration;

use bizosaas_protocol::constants::{MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY};

/// Transport state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport. Initial and terminal state.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Handshake done, frames flowing.
    Open,
    /// A manual disconnect is tearing the transport down.
    Closing,
}

impl ConnectionState {
    /// Whether this state counts as "connected" for listeners.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Transport state changed.
    StateChanged(ConnectionState),
    /// A reconnect attempt was scheduled after a close.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The attempt ceiling was hit; only a manual reconnect resumes.
    ReconnectExhausted { attempts: u32 },
    /// Frames were discarded from the outbound queue.
    OutboundDropped { count: usize },
}

/// What happened to a frame handed to `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendOutcome {
    /// Written to the open transport.
    Sent,
    /// Held in the outbound queue until the next open.
    Queued,
    /// Discarded (queue disabled or payload not encodable).
    Dropped,
}

/// Configuration for automatic reconnection with linear backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay unit; attempt N waits `base_delay * N`.
    pub base_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: RECONNECT_BASE_DELAY,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}
