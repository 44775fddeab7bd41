//! Client configuration.
//!
//! Every field has a default, so an empty TOML table is a valid config.
//! The base endpoint can be overridden with `BIZOSAAS_WS_URL`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bizosaas_protocol::constants::{
    DEFAULT_ENDPOINT, ENDPOINT_ENV, MAX_RECONNECT_ATTEMPTS, OUTBOUND_QUEUE_CAPACITY,
    RECONNECT_BASE_DELAY, WS_CONNECT_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};

use crate::types::ReconnectConfig;

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings shared by every connection the client opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Base endpoint; tenant and user ids are appended as path segments.
    pub endpoint: String,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Zero disables queuing: sends while disconnected are dropped.
    pub outbound_queue_capacity: usize,
    /// Zero disables the handshake timeout.
    pub connect_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub pong_wait_secs: u64,
    pub max_message_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY.as_millis() as u64,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            outbound_queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            connect_timeout_secs: WS_CONNECT_TIMEOUT.as_secs(),
            ping_interval_secs: WS_PING_PERIOD.as_secs(),
            pong_wait_secs: WS_PONG_WAIT.as_secs(),
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl RealtimeConfig {
    /// Defaults with the endpoint taken from the environment when set.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RealtimeConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "realtime configuration loaded");
        Ok(config.with_env_overrides())
    }

    /// Replaces the endpoint with `BIZOSAAS_WS_URL` if it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENDPOINT_ENV)
            && !url.trim().is_empty()
        {
            self.endpoint = url;
        }
        self
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = RealtimeConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reconnect(), ReconnectConfig::default());
        assert_eq!(config.outbound_queue_capacity, 64);
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.ping_period(), WS_PING_PERIOD);
        assert_eq!(config.pong_wait(), WS_PONG_WAIT);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: RealtimeConfig = toml::from_str("").unwrap();
        assert_eq!(config, RealtimeConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: RealtimeConfig = toml::from_str(
            r#"
            endpoint = "wss://rt.example.com/ws"
            max_reconnect_attempts = 8
            connect_timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "wss://rt.example.com/ws");
        assert_eq!(config.reconnect().max_attempts, 8);
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.outbound_queue_capacity, OUTBOUND_QUEUE_CAPACITY);
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("realtime.toml");
        std::fs::write(&path, "reconnect_base_delay_ms = 250\n").unwrap();

        let config = RealtimeConfig::load(&path).unwrap();
        assert_eq!(config.reconnect().base_delay, Duration::from_millis(250));
    }

    #[test]
    fn load_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = RealtimeConfig::load(&tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_invalid_toml_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "endpoint = [").unwrap();
        assert!(matches!(
            RealtimeConfig::load(&path),
            Err(ConfigError::Toml(_))
        ));
    }
}
