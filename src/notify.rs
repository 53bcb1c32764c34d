//! Best-effort notification of accepted proposals.
//!
//! Notifications run as detached background tasks after the submission has
//! been answered. Delivery is retried a bounded number of times; failures are
//! logged and dropped.

use crate::config::NotifyConfig;
use crate::error::{Error, Result};
use crate::message::{ContentId, Envelope, RelayedRecord};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// An accepted proposal, as announced to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalNotice {
    /// Network the relay serves.
    pub network: String,
    /// Community token.
    pub token: String,
    /// Proposal name.
    pub name: String,
    /// Proposal body.
    pub body: String,
    /// The envelope as submitted.
    pub envelope: Envelope,
    /// Author content id.
    pub author_content_id: ContentId,
    /// Relay content id.
    pub relay_content_id: ContentId,
}

impl ProposalNotice {
    /// Build a notice for a relayed proposal. Returns `None` for votes.
    #[must_use]
    pub fn from_record(network: &str, record: &RelayedRecord) -> Option<Self> {
        let proposal = record.proposal()?;
        Some(Self {
            network: network.to_string(),
            token: record.token().to_string(),
            name: proposal.name.clone(),
            body: proposal.body.clone(),
            envelope: record.author_envelope.clone(),
            author_content_id: record.author_content_id.clone(),
            relay_content_id: record.relay_content_id.clone(),
        })
    }

    /// Plain-text summary for a chat channel.
    #[must_use]
    pub fn chat_message(&self, gateway_url: &str) -> String {
        format!(
            "#{}\n\n**{}**\n\n{}\n\n<{}/{}>",
            self.token,
            self.name,
            self.body,
            gateway_url.trim_end_matches('/'),
            self.author_content_id
        )
    }

    /// JSON body for the webhook.
    #[must_use]
    pub fn webhook_body(&self) -> Value {
        json!({
            "network": self.network,
            "body": self.envelope,
            "authorIpfsRes": self.author_content_id,
            "relayerIpfsRes": self.relay_content_id,
        })
    }
}

/// Receives accepted proposals. Must not block or fail the caller.
pub trait Notifier: Send + Sync {
    /// Announce a proposal.
    fn notify(&self, notice: ProposalNotice);
}

/// Posts notices to a JSON webhook and a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl WebhookNotifier {
    /// Create a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        if config.webhook_url.is_none() && config.chat_webhook_url.is_none() {
            info!("No notification endpoints configured - notifications disabled");
        }

        Ok(Self { client, config })
    }

    /// Whether any endpoint is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.webhook_url.is_some() || self.config.chat_webhook_url.is_some()
    }

    /// Spawn delivery of `notice`. Returns `None` when nothing is configured.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, notice: ProposalNotice) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }

        let client = self.client.clone();
        let config = self.config.clone();
        Some(tokio::spawn(async move {
            if let Some(ref url) = config.webhook_url {
                let body = notice.webhook_body();
                deliver(&client, &config, "webhook", url, &body).await;
            }
            if let Some(ref url) = config.chat_webhook_url {
                let body = json!({ "content": notice.chat_message(&config.gateway_url) });
                deliver(&client, &config, "chat", url, &body).await;
            }
        }))
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notice: ProposalNotice) {
        drop(self.dispatch(notice));
    }
}

/// Post `body` to `url`, retrying with linear backoff.
async fn deliver(client: &reqwest::Client, config: &NotifyConfig, kind: &str, url: &str, body: &Value) {
    let attempts = config.max_attempts.max(1);

    for attempt in 1..=attempts {
        let result = client
            .post(url)
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(response) => {
                debug!("{kind} notification delivered ({})", response.status());
                return;
            }
            Err(e) if attempt < attempts => {
                debug!("{kind} notification attempt {attempt}/{attempts} failed: {e}");
                let delay = config.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                warn!("{kind} notification failed after {attempts} attempts: {e}");
            }
        }
    }
}
