//! Envelope, message and record types.
//!
//! An [`Envelope`] is what a client submits: the signed message text plus the
//! signer's address and signature. Once validated, the message text is decoded
//! into a [`Message`] whose body is a closed sum of proposal and vote payloads.
//! A [`RelayedRecord`] is the unit persisted by the dual store.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Version string clients must put in every message.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version tag written into pinned author and relay envelopes.
pub const PIN_PROTOCOL_VERSION: &str = "2";

/// Content-derived identifier assigned by the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed unit of client input.
///
/// `msg` is the exact JSON text the client signed; it is kept verbatim so the
/// signature can be rechecked by anyone holding the pinned copy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Signer address.
    #[serde(default)]
    pub address: String,
    /// Signed message text.
    #[serde(default)]
    pub msg: String,
    /// Signature over `msg`.
    #[serde(default)]
    pub sig: String,
}

/// The two kinds of governance message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A new proposal.
    Proposal,
    /// A vote on an existing proposal.
    Vote,
}

impl MessageKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Vote => "vote",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "proposal" => Some(Self::Proposal),
            "vote" => Some(Self::Vote),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proposal payload. Exactly these seven fields, no more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalPayload {
    /// Short title.
    pub name: String,
    /// Full description.
    pub body: String,
    /// Options voters pick from. Any JSON values; only their count is checked.
    pub choices: Vec<Value>,
    /// Block height (or other chain reference) balances are read at.
    pub snapshot: Value,
    /// Voting opens, epoch seconds.
    pub start: u64,
    /// Voting closes, epoch seconds.
    pub end: u64,
    /// Free-form client metadata.
    pub metadata: Value,
}

impl ProposalPayload {
    /// Whether `now` falls inside `[start, end]`.
    #[must_use]
    pub fn is_open_at(&self, now: u64) -> bool {
        self.start <= now && now <= self.end
    }
}

/// Vote payload. Exactly these three fields, no more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VotePayload {
    /// Author content id of the proposal being voted on.
    pub proposal: ContentId,
    /// Selected choice (index, list, or weighting, depending on the space).
    pub choice: Value,
    /// Free-form client metadata.
    pub metadata: Value,
}

/// Type-tagged message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum MessageBody {
    /// Proposal payload.
    Proposal(ProposalPayload),
    /// Vote payload.
    Vote(VotePayload),
}

impl MessageBody {
    /// Kind of this body.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Proposal(_) => MessageKind::Proposal,
            Self::Vote(_) => MessageKind::Vote,
        }
    }
}

/// A validated, decoded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client protocol version.
    pub version: String,
    /// Epoch seconds, as the decimal string the client signed.
    pub timestamp: String,
    /// Community the message belongs to.
    pub token: String,
    /// `type` and `payload`.
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    /// Timestamp as epoch seconds (0 if unparseable, which validation prevents).
    #[must_use]
    pub fn timestamp_secs(&self) -> u64 {
        self.timestamp.parse().unwrap_or(0)
    }

    /// Kind of this message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

/// Object pinned to the content store for both hops of the trust chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedEnvelope {
    /// Signer address (client, or relayer for the second hop).
    pub address: String,
    /// Signed text (message, or author content id for the second hop).
    pub msg: String,
    /// Signature over `msg`.
    pub sig: String,
    /// Pin format version.
    pub version: String,
}

impl PinnedEnvelope {
    /// The first hop: the client's envelope as submitted.
    #[must_use]
    pub fn author(envelope: &Envelope) -> Self {
        Self {
            address: envelope.address.clone(),
            msg: envelope.msg.clone(),
            sig: envelope.sig.clone(),
            version: PIN_PROTOCOL_VERSION.to_string(),
        }
    }

    /// The second hop: the relayer's signature over the author content id.
    #[must_use]
    pub fn relay(relayer: &str, author_id: &ContentId, relay_signature: &str) -> Self {
        Self {
            address: relayer.to_string(),
            msg: author_id.to_string(),
            sig: relay_signature.to_string(),
            version: PIN_PROTOCOL_VERSION.to_string(),
        }
    }
}

/// An accepted, pinned and counter-signed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedRecord {
    /// The envelope exactly as submitted.
    pub author_envelope: Envelope,
    /// Decoded form of `author_envelope.msg`.
    pub message: Message,
    /// Content id of the pinned author envelope. Primary key.
    pub author_content_id: ContentId,
    /// Content id of the pinned relay envelope.
    pub relay_content_id: ContentId,
    /// Relay signature over `author_content_id`.
    pub relay_signature: String,
}

impl RelayedRecord {
    /// Community token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.message.token
    }

    /// Proposal payload, if this record is a proposal.
    #[must_use]
    pub fn proposal(&self) -> Option<&ProposalPayload> {
        match &self.message.body {
            MessageBody::Proposal(payload) => Some(payload),
            MessageBody::Vote(_) => None,
        }
    }

    /// Vote payload, if this record is a vote.
    #[must_use]
    pub fn vote(&self) -> Option<&VotePayload> {
        match &self.message.body {
            MessageBody::Vote(payload) => Some(payload),
            MessageBody::Proposal(_) => None,
        }
    }

    /// Public listing entry for this record.
    #[must_use]
    pub fn listing(&self) -> Listing {
        Listing {
            address: self.author_envelope.address.clone(),
            msg: self.message.clone(),
            sig: self.author_envelope.sig.clone(),
            author_ipfs_hash: self.author_content_id.clone(),
            relayer_ipfs_hash: self.relay_content_id.clone(),
        }
    }
}

/// Public view of a relayed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Author address.
    pub address: String,
    /// Decoded message.
    pub msg: Message,
    /// Author signature.
    pub sig: String,
    /// Author content id.
    pub author_ipfs_hash: ContentId,
    /// Relay content id.
    pub relayer_ipfs_hash: ContentId,
}

/// Proposals of one token, most recent first, serialized as an ordered map
/// keyed by author content id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalIndex(pub Vec<Listing>);

impl ProposalIndex {
    /// Find a proposal by author content id.
    #[must_use]
    pub fn get(&self, id: &ContentId) -> Option<&Listing> {
        self.0.iter().find(|listing| &listing.author_ipfs_hash == id)
    }

    /// Number of proposals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no proposals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ProposalIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for listing in &self.0 {
            map.serialize_entry(listing.author_ipfs_hash.as_str(), listing)?;
        }
        map.end()
    }
}

/// Votes on one proposal keyed by voter address.
pub type VoteIndex = BTreeMap<String, Listing>;

/// Receipt returned for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Author content id.
    #[serde(rename = "ipfsHash")]
    pub ipfs_hash: ContentId,
}

/// Static description of the running relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Package name.
    pub name: String,
    /// Network the relay serves.
    pub network: String,
    /// Service (and required message) version.
    pub version: String,
    /// Relayer address.
    pub relayer: String,
}
