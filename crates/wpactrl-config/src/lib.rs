#![deny(unsafe_code)]

//! Configuration loading and validation for the wpactrl client.
//!
//! Loads TOML configuration files and validates them. [`ClientConfig`] is the
//! central structure: the `[connection]` section sizes buffers and bounds
//! waits on the control socket, the `[scan]` section drives BSS enumeration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level client configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Socket, timeout and buffer settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// BSS enumeration settings.
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Settings for a single control-interface connection.
///
/// ## TOML Example
///
/// ```toml
/// [connection]
/// local_dir = "/run/wpactrl"
/// request_timeout_ms = 3000
/// max_reply_size = 4096
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Directory holding the client-side socket the daemon replies to.
    /// Must be writable by this process.
    #[serde(default = "default_local_dir")]
    pub local_dir: String,

    /// File-name prefix of the client-side socket. The full name is
    /// `<prefix><pid>-<counter>`.
    #[serde(default = "default_local_prefix")]
    pub local_prefix: String,

    /// How long a request, ATTACH or DETACH waits for its reply.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Replies longer than this are silently truncated.
    #[serde(default = "default_max_reply_size")]
    pub max_reply_size: usize,

    /// Unsolicited messages longer than this are silently truncated.
    #[serde(default = "default_max_event_size")]
    pub max_event_size: usize,

    /// Unsolicited messages held for `recv` before the oldest is dropped.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Capacity of the broadcast channel feeding event subscribers.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            local_prefix: default_local_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            max_reply_size: default_max_reply_size(),
            max_event_size: default_max_event_size(),
            event_queue_capacity: default_event_queue_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ConnectionConfig {
    /// The reply wait as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Directory the client-side socket is created in.
    pub fn local_dir(&self) -> PathBuf {
        PathBuf::from(&self.local_dir)
    }
}

fn default_local_dir() -> String {
    "/tmp".to_string()
}

fn default_local_prefix() -> String {
    "wpa_ctrl_".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_reply_size() -> usize {
    2048
}

fn default_max_event_size() -> usize {
    256
}

fn default_event_queue_capacity() -> usize {
    256
}

fn default_event_channel_capacity() -> usize {
    64
}

/// BSS enumeration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Exclusive upper bound on the `BSS <n>` index.
    #[serde(default = "default_scan_max_index")]
    pub max_index: usize,

    /// A reply is kept as a scan result when it contains this substring.
    #[serde(default = "default_scan_match")]
    pub match_substring: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_index: default_scan_max_index(),
            match_substring: default_scan_match(),
        }
    }
}

fn default_scan_max_index() -> usize {
    1000
}

fn default_scan_match() -> String {
    "bssid=".to_string()
}

impl ClientConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let conn = &self.connection;
        if conn.local_dir.is_empty() {
            return Err(ConfigError::Validation(
                "connection.local_dir must not be empty".to_string(),
            ));
        }
        if conn.local_prefix.is_empty() || conn.local_prefix.contains('/') {
            return Err(ConfigError::Validation(format!(
                "connection.local_prefix must be a non-empty file name, got {:?}",
                conn.local_prefix
            )));
        }
        if conn.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "connection.request_timeout_ms must be non-zero".to_string(),
            ));
        }
        if conn.max_reply_size == 0 {
            return Err(ConfigError::Validation(
                "connection.max_reply_size must be non-zero".to_string(),
            ));
        }
        if conn.max_event_size == 0 {
            return Err(ConfigError::Validation(
                "connection.max_event_size must be non-zero".to_string(),
            ));
        }
        if conn.event_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "connection.event_queue_capacity must be at least 1".to_string(),
            ));
        }
        // tokio's broadcast channel panics on zero capacity
        if conn.event_channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "connection.event_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.scan.match_substring.is_empty() {
            return Err(ConfigError::Validation(
                "scan.match_substring must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
