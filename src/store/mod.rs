//! Dual-store persistence for relayed records.
//!
//! Every accepted record is written to two independent backends:
//!
//! ```text
//!            write(record)
//!                 │
//!        ┌────────┴────────┐
//!        ▼                 ▼
//!   ┌─────────┐      ┌───────────┐
//!   │  cache  │      │  durable  │     issued concurrently,
//!   │  (LRU)  │      │   (log)   │     joined before returning
//!   └─────────┘      └───────────┘
//! ```
//!
//! Reads of proposal lists and vote sets are served by the durable backend.
//! Proposal lookups during vote validation try the cache first and fall back
//! to the durable backend, writing a durable hit back into the cache.
//!
//! There is no transaction across the two backends. By default a failure on
//! either one is logged and reported as a [`RelayEvent::StoreDegraded`] event
//! but does not fail the write: the message has already been pinned and
//! counter-signed, so it counts as relayed. With strict writes enabled, any
//! backend failure fails the write instead.

mod cache;
mod durable;

pub use cache::{CacheStats, MemoryCache};
pub use durable::{LogStore, LOG_FILE};

use crate::error::{Error, Result};
use crate::event::{RelayEvent, RelayEventsSender};
use crate::message::{ContentId, ProposalIndex, RelayedRecord, VoteIndex};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One storage backend of the dual store.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Short name used in logs and events.
    fn name(&self) -> &'static str;

    /// Store a record. Storing an already present record is a no-op.
    async fn put(&self, record: &RelayedRecord) -> Result<()>;

    /// Proposals of `token`, most recent first.
    async fn proposals(&self, token: &str) -> Result<Vec<Arc<RelayedRecord>>>;

    /// Votes on `proposal`, in acceptance order.
    async fn votes(&self, token: &str, proposal: &ContentId) -> Result<Vec<Arc<RelayedRecord>>>;

    /// The proposal with author content id `id` in `token`, if any.
    async fn proposal(&self, token: &str, id: &ContentId) -> Result<Option<Arc<RelayedRecord>>>;

    /// Up to `limit` most recently stored records.
    async fn recent(&self, limit: usize) -> Result<Vec<Arc<RelayedRecord>>>;
}

/// Sort records by message timestamp, newest first. Ties keep the newest
/// accepted record first.
pub(crate) fn most_recent_first(mut records: Vec<Arc<RelayedRecord>>) -> Vec<Arc<RelayedRecord>> {
    records.reverse();
    records.sort_by_key(|record| Reverse(record.message.timestamp_secs()));
    records
}

/// Coordinates writes to, and reads from, the cache and durable backends.
pub struct DualStore {
    cache: Arc<dyn RecordBackend>,
    durable: Arc<dyn RecordBackend>,
    strict_writes: bool,
    events: Option<RelayEventsSender>,
}

impl DualStore {
    /// Create a dual store over two backends.
    #[must_use]
    pub fn new(cache: Arc<dyn RecordBackend>, durable: Arc<dyn RecordBackend>) -> Self {
        Self {
            cache,
            durable,
            strict_writes: false,
            events: None,
        }
    }

    /// Fail writes when either backend fails.
    #[must_use]
    pub fn with_strict_writes(mut self, strict: bool) -> Self {
        self.strict_writes = strict;
        self
    }

    /// Report degraded writes on an event channel.
    #[must_use]
    pub fn with_events(mut self, events: RelayEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Write a record to both backends concurrently.
    ///
    /// Returns once both attempts have settled.
    ///
    /// # Errors
    ///
    /// Only with strict writes enabled: returns an error naming every backend
    /// that failed.
    pub async fn write(&self, record: &RelayedRecord) -> Result<()> {
        let (cache, durable) =
            futures::future::join(self.cache.put(record), self.durable.put(record)).await;

        let mut failures = Vec::new();
        for (backend, outcome) in [(self.cache.name(), cache), (self.durable.name(), durable)] {
            if let Err(e) = outcome {
                warn!(
                    "Failed to store {} in {backend} backend: {e}",
                    record.author_content_id
                );
                if let Some(ref events) = self.events {
                    let _ = events.send(RelayEvent::StoreDegraded {
                        backend,
                        id: record.author_content_id.clone(),
                        message: e.to_string(),
                    });
                }
                failures.push(format!("{backend}: {e}"));
            }
        }

        if self.strict_writes && !failures.is_empty() {
            return Err(Error::Storage(failures.join("; ")));
        }
        Ok(())
    }

    /// Proposals of `token`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable backend cannot be read.
    pub async fn read_proposals(&self, token: &str) -> Result<ProposalIndex> {
        let records = self.durable.proposals(token).await?;
        Ok(ProposalIndex(
            records.iter().map(|record| record.listing()).collect(),
        ))
    }

    /// Votes on `proposal` keyed by voter address. A later vote from the same
    /// address replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable backend cannot be read.
    pub async fn read_votes(&self, token: &str, proposal: &ContentId) -> Result<VoteIndex> {
        let records = self.durable.votes(token, proposal).await?;
        Ok(records
            .iter()
            .map(|record| (record.author_envelope.address.clone(), record.listing()))
            .collect())
    }

    /// Look up a proposal, cache first.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable backend cannot be read. A cache
    /// failure only costs the fast path.
    pub async fn lookup_proposal(
        &self,
        token: &str,
        id: &ContentId,
    ) -> Result<Option<Arc<RelayedRecord>>> {
        match self.cache.proposal(token, id).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => warn!("Cache lookup of {id} failed: {e}"),
        }

        let found = self.durable.proposal(token, id).await?;
        if let Some(ref record) = found {
            debug!("Proposal {id} served from durable store, caching");
            if let Err(e) = self.cache.put(record).await {
                debug!("Could not cache proposal {id}: {e}");
            }
        }
        Ok(found)
    }

    /// Repopulate the cache with up to `limit` of the most recently stored
    /// durable records. Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable backend cannot be read.
    pub async fn warm_cache(&self, limit: usize) -> Result<usize> {
        let records = self.durable.recent(limit).await?;
        // Oldest first, so the newest end up most recently used.
        let mut loaded = 0;
        for record in records.iter().rev() {
            match self.cache.put(record).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Could not warm cache with {}: {e}", record.author_content_id),
            }
        }

        info!("Warmed cache with {loaded} records");
        if let Some(ref events) = self.events {
            let _ = events.send(RelayEvent::CacheWarmed { records: loaded });
        }
        Ok(loaded)
    }

    /// The cache backend.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn RecordBackend> {
        &self.cache
    }

    /// The durable backend.
    #[must_use]
    pub fn durable(&self) -> &Arc<dyn RecordBackend> {
        &self.durable
    }
}
