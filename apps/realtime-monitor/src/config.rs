//! Monitor configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/bizosaas/realtime-monitor.toml`
//! - Windows: `%APPDATA%/bizosaas/realtime-monitor.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bizosaas_protocol::constants::{MSG_AGENT_STATUS, MSG_METRICS_UPDATE};
use bizosaas_realtime::RealtimeConfig;

/// Monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_tenant")]
    pub tenant_id: String,

    #[serde(default = "default_user")]
    pub user_id: String,

    /// Message types to print.
    #[serde(default = "default_message_types")]
    pub message_types: Vec<String>,

    /// Connection settings shared with the library.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

fn default_tenant() -> String {
    "default".into()
}

fn default_user() -> String {
    "monitor".into()
}

fn default_message_types() -> Vec<String> {
    vec![MSG_METRICS_UPDATE.into(), MSG_AGENT_STATUS.into()]
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant(),
            user_id: default_user(),
            message_types: default_message_types(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from disk, or creates a default if not found.
    /// `BIZOSAAS_WS_URL` overrides the stored endpoint.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;
        let mut config = if path.exists() {
            Self::read(&path)?
        } else {
            let config = MonitorConfig::default();
            config.save_to(&path)?;
            config
        };
        config.realtime = config.realtime.with_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies `[tenant] [user] [type...]` from the command line.
    pub fn apply_args(&mut self, args: impl IntoIterator<Item = String>) {
        let mut args = args.into_iter();
        if let Some(tenant) = args.next() {
            self.tenant_id = tenant;
        }
        if let Some(user) = args.next() {
            self.user_id = user;
        }
        let types: Vec<String> = args.collect();
        if !types.is_empty() {
            self.message_types = types;
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("bizosaas")
            .join("realtime-monitor.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("bizosaas")
            .join("realtime-monitor.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/bizosaas/realtime-monitor.toml"))
    }
}
