//! Error types for snapshot-relay.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a submitted envelope is rejected.
///
/// Rejections are client-caused and deterministic: resubmitting the same
/// envelope yields the same reason. The display text is returned verbatim to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Address, message or signature missing.
    #[error("wrong message body")]
    MessageBody,

    /// Signed message is not the expected five-field object.
    #[error("wrong signed message")]
    SignedMessage,

    /// Timestamp missing, non-numeric, or too far in the future.
    #[error("wrong timestamp")]
    Timestamp,

    /// Message version differs from the service version.
    #[error("wrong version")]
    Version,

    /// Message type is neither `proposal` nor `vote`.
    #[error("wrong message type")]
    MessageType,

    /// Signature does not verify for the claimed address.
    #[error("wrong signature")]
    Signature,

    /// Proposal payload has the wrong shape.
    #[error("wrong proposal format")]
    ProposalFormat,

    /// Proposal name or body empty or too long.
    #[error("wrong proposal size")]
    ProposalSize,

    /// Proposal metadata is not an object or is too large.
    #[error("wrong proposal metadata")]
    ProposalMetadata,

    /// Proposal start/end missing or not ordered.
    #[error("wrong proposal period")]
    ProposalPeriod,

    /// Vote payload has the wrong shape.
    #[error("wrong vote format")]
    VoteFormat,

    /// Vote metadata is not an object or is too large.
    #[error("wrong vote metadata")]
    VoteMetadata,

    /// Vote references a proposal the relay has never accepted.
    #[error("unknown proposal")]
    UnknownProposal,

    /// Vote arrived before the proposal opened or after it closed.
    #[error("not in voting window")]
    VotingWindow,
}

/// Error type for snapshot-relay operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Envelope failed validation.
    #[error("Message rejected: {0}")]
    Rejected(#[from] Rejection),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Content store (pinning) error.
    #[error("Content store error: {0}")]
    ContentStore(String),

    /// Record storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Response text for infrastructure failures. Details stay in the logs.
pub const SERVICE_FAILURE: &str = "failed to relay message";

impl Error {
    /// The rejection reason, if this error is a validation failure.
    #[must_use]
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Text safe to hand back to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        self.rejection()
            .map_or_else(|| SERVICE_FAILURE.to_string(), |reason| reason.to_string())
    }
}
