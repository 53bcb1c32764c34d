//! Command-line interface definition.

use clap::Parser;
use snapshot_relay::RelayConfig;
use std::path::PathBuf;

/// Relay for signed off-chain governance proposals and votes.
#[derive(Parser, Debug)]
#[command(name = "snapshot-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory for relay data.
    #[arg(long, env = "SNAPSHOT_RELAY_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Network name reported to clients and webhooks.
    #[arg(long, env = "SNAPSHOT_RELAY_NETWORK")]
    pub network: Option<String>,

    /// Relayer key file (created with snapshot-relay-keygen).
    #[arg(long, env = "SNAPSHOT_RELAY_KEY_FILE")]
    pub relayer_key_file: Option<PathBuf>,

    /// Fail submissions when either store backend fails to persist them.
    #[arg(long, env = "SNAPSHOT_RELAY_STRICT_WRITES")]
    pub strict_writes: bool,

    /// JSON webhook notified of accepted proposals.
    #[arg(long, env = "SNAPSHOT_RELAY_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Chat webhook receiving proposal summaries.
    #[arg(long, env = "SNAPSHOT_RELAY_CHAT_WEBHOOK_URL")]
    pub chat_webhook_url: Option<String>,

    /// Log level. Defaults to the config file's `log_level`; `RUST_LOG`
    /// overrides both.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments into a `RelayConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<RelayConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            RelayConfig::from_file(path)?
        } else {
            RelayConfig::default()
        };

        // Override with CLI arguments
        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(network) = self.network {
            config.network = network;
        }
        if self.relayer_key_file.is_some() {
            config.relayer_key_file = self.relayer_key_file;
        }
        if self.webhook_url.is_some() {
            config.notify.webhook_url = self.webhook_url;
        }
        if self.chat_webhook_url.is_some() {
            config.notify.chat_webhook_url = self.chat_webhook_url;
        }

        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        config.strict_writes |= self.strict_writes;

        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "log_level = \"debug\"\nnetwork = \"mainnet\"\n").unwrap();
        path
    }

    #[test]
    fn test_file_log_level_applies_without_flag() {
        let dir = TempDir::new().unwrap();
        let path = config_file(&dir);
        let cli = Cli::parse_from(["snapshot-relay", "--config", path.to_str().unwrap()]);

        let config = cli.into_config().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.network, "mainnet");
    }

    #[test]
    fn test_log_level_flag_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = config_file(&dir);
        let cli = Cli::parse_from([
            "snapshot-relay",
            "--config",
            path.to_str().unwrap(),
            "--log-level",
            "warn",
        ]);

        assert_eq!(cli.into_config().unwrap().log_level, "warn");
    }

    #[test]
    fn test_default_log_level_without_file() {
        let cli = Cli::parse_from(["snapshot-relay"]);
        assert_eq!(cli.into_config().unwrap().log_level, "info");
    }
}
