//! Configuration for snapshot-relay.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Root directory for relay data (pins, record log, key).
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Network name reported by the service and sent with webhooks.
    #[serde(default = "default_network")]
    pub network: String,

    /// Path to the relayer key file. Defaults to `<root_dir>/relayer.key`.
    #[serde(default)]
    pub relayer_key_file: Option<PathBuf>,

    /// Maximum number of records held in the cache backend.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Records loaded into the cache from the durable store at startup.
    #[serde(default = "default_warm_cache_limit")]
    pub warm_cache_limit: usize,

    /// Fail a submission when either store backend fails to persist it.
    #[serde(default)]
    pub strict_writes: bool,

    /// Notification configuration.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log filter used when neither `--log-level` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Outbound notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// JSON webhook notified of every accepted proposal.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Chat webhook that receives a plain-text proposal summary.
    #[serde(default)]
    pub chat_webhook_url: Option<String>,

    /// Gateway base URL used to link pinned proposals.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Delivery attempts per notification.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; later retries wait proportionally longer.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            network: default_network(),
            relayer_key_file: None,
            cache_capacity: default_cache_capacity(),
            warm_cache_limit: default_warm_cache_limit(),
            strict_writes: false,
            notify: NotifyConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            chat_webhook_url: None,
            gateway_url: default_gateway_url(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "snapshot-relay")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".snapshot-relay"))
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gateway_url() -> String {
    "https://ipfs.fleek.co/ipfs".to_string()
}

const fn default_cache_capacity() -> usize {
    100_000
}

const fn default_warm_cache_limit() -> usize {
    10_000
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    500
}

const fn default_request_timeout() -> u64 {
    10
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Relayer key file, falling back to `<root_dir>/relayer.key`.
    #[must_use]
    pub fn key_file(&self) -> PathBuf {
        self.relayer_key_file
            .clone()
            .unwrap_or_else(|| self.root_dir.join("relayer.key"))
    }

    /// Directory for pinned envelopes.
    #[must_use]
    pub fn pin_dir(&self) -> PathBuf {
        self.root_dir.join("pins")
    }

    /// Directory for the durable record log.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.root_dir.join("store")
    }
}
