//! # snapshot-relay
//!
//! A relay for signed off-chain governance messages.
//!
//! Clients submit proposals and votes as signed envelopes. The relay
//! validates each envelope, pins it to a content store, counter-signs the
//! resulting content id with its own key, pins that relay envelope too, and
//! records both ids in a cache and a durable store. Accepted proposals are
//! announced to configured webhooks.
//!
//! ## Pipeline
//!
//! ```text
//! envelope ─► validate ─► pin author ─► relay-sign ─► pin relay ─► dual write ─► notify
//! ```
//!
//! ## Signatures
//!
//! Client and relay signatures both use ML-DSA-65 (FIPS 204). An address is
//! `0x` followed by the hex of the last 20 bytes of the SHA-256 of the public
//! key; a signature string carries the public key followed by the signature.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snapshot_relay::{RelayConfig, RelayNodeBuilder};
//!
//! #[tokio::main]
//! async fn main() -> snapshot_relay::Result<()> {
//!     let config = RelayConfig::default();
//!     let mut relay = RelayNodeBuilder::new(config).build().await?;
//!     relay.run().await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod content;
pub mod crypto;
pub mod error;
pub mod event;
pub mod message;
pub mod node;
pub mod notify;
pub mod relay;
pub mod store;
pub mod validator;

pub use config::{NotifyConfig, RelayConfig};
pub use content::{ContentStore, LocalPinStore};
pub use crypto::{MlDsaVerifier, RelaySigner, Verifier};
pub use error::{Error, Rejection, Result};
pub use event::{RelayEvent, RelayEventsChannel};
pub use message::{
    ContentId, Envelope, Listing, Message, MessageKind, ProposalIndex, RelayedRecord,
    ServiceInfo, SubmitReceipt, VoteIndex,
};
pub use node::{RelayNodeBuilder, RunningRelay};
pub use notify::{Notifier, ProposalNotice, WebhookNotifier};
pub use relay::{RelayService, RelayServiceBuilder};
pub use store::{DualStore, LogStore, MemoryCache, RecordBackend};
