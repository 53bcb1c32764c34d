//! Relay event system.

use crate::message::{ContentId, MessageKind};
use tokio::sync::broadcast;

/// Events emitted by the relay.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Relay has started successfully.
    Started,

    /// Relay is shutting down.
    ShuttingDown,

    /// A message passed validation, was pinned, signed and persisted.
    MessageAccepted {
        /// Community token.
        token: String,
        /// Proposal or vote.
        kind: MessageKind,
        /// Author content id.
        id: ContentId,
    },

    /// A message failed validation.
    MessageRejected {
        /// Signer address as submitted.
        address: String,
        /// Rejection reason.
        reason: String,
    },

    /// One store backend failed to persist an accepted record.
    StoreDegraded {
        /// Backend name.
        backend: &'static str,
        /// Author content id of the record.
        id: ContentId,
        /// Error description.
        message: String,
    },

    /// The cache was repopulated from the durable store.
    CacheWarmed {
        /// Number of records loaded.
        records: usize,
    },
}

/// Channel for receiving relay events.
pub type RelayEventsChannel = broadcast::Receiver<RelayEvent>;

/// Sender for relay events.
pub type RelayEventsSender = broadcast::Sender<RelayEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (RelayEventsSender, RelayEventsChannel) {
    broadcast::channel(256)
}
