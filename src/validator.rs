//! Message validation state machine.
//!
//! Checks run in a fixed order and stop at the first failure. Cheap
//! structural checks come first; the signature check is the most expensive
//! and runs only once the message is known to be well-formed, current and of
//! a known type. Type-specific payload checks come last because a vote needs
//! a store lookup.
//!
//! ```text
//! envelope ─► body ─► signed message ─► timestamp ─► version ─► type
//!                                                               │
//!            payload (proposal | vote) ◄─── signature ◄─────────┘
//! ```
//!
//! Payload keys are checked first: unknown or missing keys fail the format
//! check. Field values stay untyped until the step that owns them, so a
//! `null` start is a period failure and a numeric name is a size failure.
//! Only then is the payload built into [`ProposalPayload`] / [`VotePayload`].

use crate::crypto::Verifier;
use crate::error::{Rejection, Result};
use crate::message::{
    ContentId, Envelope, Message, MessageBody, MessageKind, ProposalPayload, VotePayload,
    SERVICE_VERSION,
};
use crate::store::DualStore;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// How far into the future a message timestamp may be, in seconds.
pub const MAX_FUTURE_SKEW_SECS: u64 = 30;

/// Maximum proposal name length, in characters.
pub const MAX_NAME_CHARS: usize = 256;

/// Maximum proposal body length, in characters.
pub const MAX_BODY_CHARS: usize = 40_000;

/// Maximum serialized proposal metadata size, in bytes.
pub const MAX_PROPOSAL_METADATA_BYTES: usize = 20_000;

/// Maximum serialized vote metadata size, in bytes.
pub const MAX_VOTE_METADATA_BYTES: usize = 10_000;

/// The five top-level fields of a signed message, before any checks.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SignedMessage {
    version: Value,
    timestamp: Value,
    token: Value,
    #[serde(rename = "type")]
    kind: Value,
    payload: Value,
}

/// Whether a JSON value counts as supplied: `null`, `false`, `0` and `""`
/// do not.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether `metadata` is an object whose JSON encoding fits in `max_bytes`.
fn metadata_fits(metadata: &Value, max_bytes: usize) -> bool {
    metadata.is_object()
        && serde_json::to_string(metadata).is_ok_and(|encoded| encoded.len() <= max_bytes)
}

/// Parse the timestamp and reject it if it lies too far in the future.
///
/// There is no lower bound: old messages are accepted.
fn check_timestamp(timestamp: &Value, now: u64) -> std::result::Result<String, Rejection> {
    let Value::String(text) = timestamp else {
        return Err(Rejection::Timestamp);
    };
    let secs: u64 = text.parse().map_err(|_| Rejection::Timestamp)?;
    if secs > now.saturating_add(MAX_FUTURE_SKEW_SECS) {
        return Err(Rejection::Timestamp);
    }
    Ok(text.clone())
}

/// The seven proposal fields, undecoded. Unknown or missing keys fail here.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposalFields {
    name: Value,
    body: Value,
    choices: Value,
    snapshot: Value,
    start: Value,
    end: Value,
    metadata: Value,
}

/// The three vote fields, undecoded.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VoteFields {
    proposal: Value,
    choice: Value,
    metadata: Value,
}

/// A non-empty string of at most `max_chars` characters.
fn bounded_text(value: Value, max_chars: usize) -> Option<String> {
    match value {
        Value::String(text) if (1..=max_chars).contains(&text.chars().count()) => Some(text),
        _ => None,
    }
}

/// A positive integer number of epoch seconds.
fn epoch_secs(value: &Value) -> Option<u64> {
    value.as_u64().filter(|&secs| secs > 0)
}

/// Decode and check a proposal payload.
pub(crate) fn check_proposal(
    payload: Map<String, Value>,
) -> std::result::Result<ProposalPayload, Rejection> {
    let fields: ProposalFields =
        serde_json::from_value(Value::Object(payload)).map_err(|_| Rejection::ProposalFormat)?;

    let choices = match fields.choices {
        Value::Array(choices) if choices.len() >= 2 => choices,
        _ => return Err(Rejection::ProposalFormat),
    };
    if !is_present(&fields.snapshot) || !is_present(&fields.metadata) {
        return Err(Rejection::ProposalFormat);
    }

    let name = bounded_text(fields.name, MAX_NAME_CHARS).ok_or(Rejection::ProposalSize)?;
    let body = bounded_text(fields.body, MAX_BODY_CHARS).ok_or(Rejection::ProposalSize)?;

    if !metadata_fits(&fields.metadata, MAX_PROPOSAL_METADATA_BYTES) {
        return Err(Rejection::ProposalMetadata);
    }

    let (start, end) = match (epoch_secs(&fields.start), epoch_secs(&fields.end)) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(Rejection::ProposalPeriod),
    };

    Ok(ProposalPayload {
        name,
        body,
        choices,
        snapshot: fields.snapshot,
        start,
        end,
        metadata: fields.metadata,
    })
}

/// Decode and check a vote payload. Whether the target proposal exists is
/// checked separately since that needs the store.
pub(crate) fn check_vote(payload: Map<String, Value>) -> std::result::Result<VotePayload, Rejection> {
    let fields: VoteFields =
        serde_json::from_value(Value::Object(payload)).map_err(|_| Rejection::VoteFormat)?;

    if !is_present(&fields.proposal) || !is_present(&fields.choice) || !is_present(&fields.metadata)
    {
        return Err(Rejection::VoteFormat);
    }

    if !metadata_fits(&fields.metadata, MAX_VOTE_METADATA_BYTES) {
        return Err(Rejection::VoteMetadata);
    }

    // Proposals are keyed by string ids; nothing else can name one.
    let Value::String(proposal) = fields.proposal else {
        return Err(Rejection::UnknownProposal);
    };

    Ok(VotePayload {
        proposal: ContentId::new(proposal),
        choice: fields.choice,
        metadata: fields.metadata,
    })
}

/// Validates submitted envelopes.
pub struct MessageValidator {
    version: String,
    verifier: Arc<dyn Verifier>,
    store: Arc<DualStore>,
}

impl MessageValidator {
    /// Create a validator that requires [`SERVICE_VERSION`].
    #[must_use]
    pub fn new(verifier: Arc<dyn Verifier>, store: Arc<DualStore>) -> Self {
        Self {
            version: SERVICE_VERSION.to_string(),
            verifier,
            store,
        }
    }

    /// Require a different message version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The message version this validator requires.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Validate `envelope` at time `now` (epoch seconds).
    ///
    /// Returns the decoded message on success.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rejected`] with the first failed check, or a
    /// service error if the proposal lookup for a vote fails.
    pub async fn validate(&self, envelope: &Envelope, now: u64) -> Result<Message> {
        if envelope.address.is_empty() || envelope.msg.is_empty() || envelope.sig.is_empty() {
            return Err(Rejection::MessageBody.into());
        }

        let signed: SignedMessage =
            serde_json::from_str(&envelope.msg).map_err(|_| Rejection::SignedMessage)?;

        let token = match signed.token {
            Value::String(token) if !token.is_empty() => token,
            _ => return Err(Rejection::SignedMessage.into()),
        };
        let payload = match signed.payload {
            Value::Object(payload) if !payload.is_empty() => payload,
            _ => return Err(Rejection::SignedMessage.into()),
        };

        let timestamp = check_timestamp(&signed.timestamp, now)?;

        let version = match signed.version {
            Value::String(version) if version == self.version => version,
            _ => return Err(Rejection::Version.into()),
        };

        let kind = signed
            .kind
            .as_str()
            .and_then(MessageKind::parse)
            .ok_or(Rejection::MessageType)?;

        if !self
            .verifier
            .verify(&envelope.address, envelope.msg.as_bytes(), &envelope.sig)
            .await
        {
            return Err(Rejection::Signature.into());
        }

        let body = match kind {
            MessageKind::Proposal => MessageBody::Proposal(check_proposal(payload)?),
            MessageKind::Vote => {
                let vote = check_vote(payload)?;
                self.check_vote_target(&token, &vote, now).await?;
                MessageBody::Vote(vote)
            }
        };

        debug!("Validated {kind} from {} for {token}", envelope.address);
        Ok(Message {
            version,
            timestamp,
            token,
            body,
        })
    }

    async fn check_vote_target(&self, token: &str, vote: &VotePayload, now: u64) -> Result<()> {
        let record = self
            .store
            .lookup_proposal(token, &vote.proposal)
            .await?
            .ok_or(Rejection::UnknownProposal)?;

        let open = record
            .proposal()
            .is_some_and(|proposal| proposal.is_open_at(now));
        if !open {
            return Err(Rejection::VotingWindow.into());
        }
        Ok(())
    }
}
