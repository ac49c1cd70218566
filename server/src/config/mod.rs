use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MobileServerError, Result};

pub const DEFAULT_BACKLOG: u32 = 50;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 60_000;
pub const DEFAULT_LOCALE: &str = "en-US";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Host name or IP to bind; all interfaces when unset.
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Fixed pause after a listening-socket failure.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Locale passed to the monitor on login.
    #[serde(default = "default_locale")]
    pub locale: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

fn default_port() -> u16 {
    mobile_protocol::DEFAULT_PORT
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            port: default_port(),
            backlog: default_backlog(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
        }
    }
}

impl ServerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MobileServerError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: ServerConfig = toml::from_str(&content).map_err(|e| {
            MobileServerError::Config(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry.delay_ms)
    }
}
