//! Test harness that runs a relay node against a temporary data directory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::new_without_default)]

use serde_json::{json, Value};
use snapshot_relay::message::SERVICE_VERSION;
use snapshot_relay::relay::unix_now;
use snapshot_relay::{Envelope, RelayConfig, RelayNodeBuilder, RelaySigner, RunningRelay};
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

/// Manages a relay node and its data directory.
///
/// The directory outlives the node, so a test can stop the relay and start a
/// new one over the same data.
pub struct TestHarness {
    dir: TempDir,
    config: RelayConfig,
    relay: Option<RunningRelay>,
}

impl TestHarness {
    /// Create a data directory with a fresh relayer key and start a relay.
    pub async fn setup() -> Self {
        Self::setup_with(|_| {}).await
    }

    /// Like [`TestHarness::setup`], adjusting the configuration first.
    pub async fn setup_with(adjust: impl FnOnce(&mut RelayConfig)) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = RelayConfig {
            root_dir: dir.path().to_path_buf(),
            ..RelayConfig::default()
        };
        adjust(&mut config);

        std::fs::create_dir_all(&config.root_dir).unwrap();
        std::fs::write(config.key_file(), RelaySigner::generate().unwrap().to_hex())
            .expect("Failed to write relayer key");

        let mut harness = Self {
            dir,
            config,
            relay: None,
        };
        harness.start().await;
        harness
    }

    /// Start (or restart) the relay over the harness directory.
    pub async fn start(&mut self) {
        self.relay = None;
        let relay = RelayNodeBuilder::new(self.config.clone())
            .build()
            .await
            .expect("Failed to build relay");
        info!("Test relay started at {}", self.dir.path().display());
        self.relay = Some(relay);
    }

    /// The running relay.
    pub fn relay(&mut self) -> &mut RunningRelay {
        self.relay.as_mut().expect("Relay not running")
    }

    /// The relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The data directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Submit `envelope`, returning the JSON response.
    pub async fn submit(&mut self, envelope: &Envelope) -> Value {
        let service = self.relay().service().clone();
        match service.submit_message(envelope).await {
            Ok(receipt) => serde_json::to_value(receipt).unwrap(),
            Err(e) => json!({ "error": e.client_message() }),
        }
    }

    /// Submit `envelope` and return its author content id, panicking on
    /// rejection.
    pub async fn submit_ok(&mut self, envelope: &Envelope) -> String {
        let response = self.submit(envelope).await;
        response["ipfsHash"]
            .as_str()
            .unwrap_or_else(|| panic!("submission failed: {response}"))
            .to_string()
    }
}

/// A client holding its own signing key.
pub struct TestClient {
    key: RelaySigner,
}

impl TestClient {
    /// A client with a fresh key.
    pub fn new() -> Self {
        Self {
            key: RelaySigner::generate().unwrap(),
        }
    }

    /// The client's address.
    pub fn address(&self) -> &str {
        self.key.address()
    }

    /// Sign a message of `kind` with the given payload, timestamped now.
    pub fn envelope(&self, token: &str, kind: &str, payload: Value) -> Envelope {
        let msg = json!({
            "version": SERVICE_VERSION,
            "timestamp": unix_now().to_string(),
            "token": token,
            "type": kind,
            "payload": payload,
        })
        .to_string();
        Envelope {
            address: self.address().to_string(),
            sig: self.key.sign_message(msg.as_bytes()).unwrap(),
            msg,
        }
    }

    /// A proposal open from `start` to `end`.
    pub fn proposal(&self, token: &str, name: &str, start: u64, end: u64) -> Envelope {
        self.envelope(
            token,
            "proposal",
            json!({
                "name": name,
                "body": format!("Body of {name}"),
                "choices": ["For", "Against"],
                "snapshot": "9000000",
                "start": start,
                "end": end,
                "metadata": {},
            }),
        )
    }

    /// A vote for `choice` on `proposal`.
    pub fn vote(&self, token: &str, proposal: &str, choice: u64) -> Envelope {
        self.envelope(
            token,
            "vote",
            json!({ "proposal": proposal, "choice": choice, "metadata": {} }),
        )
    }
}
