//! The relay pipeline.
//!
//! ```text
//! Received ─► Validated ─► AuthorPinned ─► RelaySigned ─► RelayPinned ─► Persisted ─► [Notified]
//!    │                          │               │              │             │
//!    ▼                          └───────────────┴──────────────┴─────────────┘
//! Rejected(reason)                                    Failed(service error)
//! ```
//!
//! Each submission is handled independently. The only shared state is the
//! relayer key and the two store backends, all append-only from here.

use crate::content::ContentStore;
use crate::crypto::{MlDsaVerifier, RelaySigner, Verifier};
use crate::error::Result;
use crate::event::{RelayEvent, RelayEventsSender};
use crate::message::{
    ContentId, Envelope, PinnedEnvelope, ProposalIndex, RelayedRecord, ServiceInfo,
    SubmitReceipt, VoteIndex, SERVICE_VERSION,
};
use crate::notify::{Notifier, ProposalNotice};
use crate::store::DualStore;
use crate::validator::MessageValidator;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Current time in epoch seconds.
#[must_use]
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Pin label for an envelope, derived from its signature.
fn pin_label(signature: &str) -> String {
    let prefix: String = signature.chars().take(16).collect();
    format!("snapshot/{prefix}")
}

/// Builder for [`RelayService`].
pub struct RelayServiceBuilder {
    signer: Arc<RelaySigner>,
    content: Arc<dyn ContentStore>,
    store: Arc<DualStore>,
    verifier: Arc<dyn Verifier>,
    notifier: Option<Arc<dyn Notifier>>,
    events: Option<RelayEventsSender>,
    network: String,
    version: String,
}

impl RelayServiceBuilder {
    /// Verifier for client signatures. Defaults to [`MlDsaVerifier`].
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Notifier for accepted proposals. Defaults to none.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Event channel for accept/reject events.
    #[must_use]
    pub fn events(mut self, events: RelayEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Network name. Defaults to `testnet`.
    #[must_use]
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Required message version. Defaults to [`SERVICE_VERSION`].
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Build the service.
    #[must_use]
    pub fn build(self) -> RelayService {
        let validator = MessageValidator::new(self.verifier, Arc::clone(&self.store))
            .with_version(self.version);
        RelayService {
            network: self.network,
            validator,
            signer: self.signer,
            content: self.content,
            store: self.store,
            notifier: self.notifier,
            events: self.events,
        }
    }
}

/// Validates, counter-signs, persists and announces governance messages.
pub struct RelayService {
    network: String,
    validator: MessageValidator,
    signer: Arc<RelaySigner>,
    content: Arc<dyn ContentStore>,
    store: Arc<DualStore>,
    notifier: Option<Arc<dyn Notifier>>,
    events: Option<RelayEventsSender>,
}

impl RelayService {
    /// Start building a service around its required collaborators.
    #[must_use]
    pub fn builder(
        signer: Arc<RelaySigner>,
        content: Arc<dyn ContentStore>,
        store: Arc<DualStore>,
    ) -> RelayServiceBuilder {
        RelayServiceBuilder {
            signer,
            content,
            store,
            verifier: Arc::new(MlDsaVerifier),
            notifier: None,
            events: None,
            network: "testnet".to_string(),
            version: SERVICE_VERSION.to_string(),
        }
    }

    /// Relay a submitted envelope.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rejected`] if validation fails, or a service
    /// error if pinning, signing or (with strict writes) persisting fails.
    pub async fn submit_message(&self, envelope: &Envelope) -> Result<SubmitReceipt> {
        self.submit_message_at(envelope, unix_now()).await
    }

    /// Relay a submitted envelope as of time `now` (epoch seconds).
    ///
    /// # Errors
    ///
    /// See [`RelayService::submit_message`].
    pub async fn submit_message_at(&self, envelope: &Envelope, now: u64) -> Result<SubmitReceipt> {
        let message = match self.validator.validate(envelope, now).await {
            Ok(message) => message,
            Err(e) => {
                if let Some(reason) = e.rejection() {
                    debug!("Rejected message from {}: {reason}", envelope.address);
                    self.emit(RelayEvent::MessageRejected {
                        address: envelope.address.clone(),
                        reason: reason.to_string(),
                    });
                } else {
                    warn!("Validation of message from {} failed: {e}", envelope.address);
                }
                return Err(e);
            }
        };

        let author = serde_json::to_value(PinnedEnvelope::author(envelope))?;
        let author_content_id = self.content.pin(&pin_label(&envelope.sig), &author).await?;

        let relay_signature = self.signer.sign(&author_content_id)?;
        let relay = serde_json::to_value(PinnedEnvelope::relay(
            self.signer.address(),
            &author_content_id,
            &relay_signature,
        ))?;
        let relay_content_id = self.content.pin(&pin_label(&relay_signature), &relay).await?;

        let record = RelayedRecord {
            author_envelope: envelope.clone(),
            message,
            author_content_id,
            relay_content_id,
            relay_signature,
        };
        self.store.write(&record).await?;

        if let (Some(notifier), Some(notice)) = (
            self.notifier.as_ref(),
            ProposalNotice::from_record(&self.network, &record),
        ) {
            notifier.notify(notice);
        }

        info!(
            address = %envelope.address,
            token = %record.token(),
            kind = %record.message.kind(),
            id = %record.author_content_id,
            "Relayed message"
        );
        self.emit(RelayEvent::MessageAccepted {
            token: record.token().to_string(),
            kind: record.message.kind(),
            id: record.author_content_id.clone(),
        });

        Ok(SubmitReceipt {
            ipfs_hash: record.author_content_id,
        })
    }

    /// Proposals of `token`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_proposals(&self, token: &str) -> Result<ProposalIndex> {
        self.store.read_proposals(token).await
    }

    /// Votes on `proposal` keyed by voter address.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_votes(&self, token: &str, proposal: &ContentId) -> Result<VoteIndex> {
        self.store.read_votes(token, proposal).await
    }

    /// Static description of the relay.
    #[must_use]
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            network: self.network.clone(),
            version: self.validator.version().to_string(),
            relayer: self.signer.address().to_string(),
        }
    }

    /// The dual store.
    #[must_use]
    pub fn store(&self) -> &Arc<DualStore> {
        &self.store
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(ref events) = self.events {
            let _ = events.send(event);
        }
    }
}
