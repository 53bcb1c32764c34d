//! LRU cache backend for relayed records.
//!
//! The fast half of the dual store. It keeps the most recently written (or
//! looked up) records in memory together with per-token proposal and vote
//! indexes. Evicted records are dropped from the indexes as well, so the
//! indexes never point at records the cache no longer holds.

use super::RecordBackend;
use crate::error::Result;
use crate::message::{ContentId, RelayedRecord};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// In-memory LRU cache of relayed records.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<CacheInner>>,
    stats: Arc<Mutex<CacheStats>>,
}

struct CacheInner {
    records: LruCache<ContentId, Arc<RelayedRecord>>,
    /// token -> proposal ids in insertion order
    proposals: HashMap<String, Vec<ContentId>>,
    /// (token, proposal id) -> vote ids in insertion order
    votes: HashMap<(String, ContentId), Vec<ContentId>>,
}

impl CacheInner {
    fn index(&mut self, record: &RelayedRecord) {
        let id = record.author_content_id.clone();
        if record.proposal().is_some() {
            self.proposals
                .entry(record.token().to_string())
                .or_default()
                .push(id);
        } else if let Some(vote) = record.vote() {
            self.votes
                .entry((record.token().to_string(), vote.proposal.clone()))
                .or_default()
                .push(id);
        }
    }

    fn unindex(&mut self, record: &RelayedRecord) {
        let id = &record.author_content_id;
        if record.proposal().is_some() {
            if let Some(ids) = self.proposals.get_mut(record.token()) {
                ids.retain(|other| other != id);
            }
        } else if let Some(vote) = record.vote() {
            let key = (record.token().to_string(), vote.proposal.clone());
            if let Some(ids) = self.votes.get_mut(&key) {
                ids.retain(|other| other != id);
            }
        }
    }

    fn resolve(&self, ids: Option<&Vec<ContentId>>) -> Vec<Arc<RelayedRecord>> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.records.peek(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of proposal lookup hits.
    pub hits: u64,
    /// Number of proposal lookup misses.
    pub misses: u64,
    /// Number of records added.
    pub additions: u64,
    /// Number of records evicted.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl MemoryCache {
    /// Create a new cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                records: LruCache::new(cap),
                proposals: HashMap::new(),
                votes: HashMap::new(),
            })),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Insert a record, evicting the least recently used one if full.
    pub fn insert(&self, record: Arc<RelayedRecord>) {
        let mut inner = self.inner.lock();
        if inner.records.contains(&record.author_content_id) {
            inner.records.promote(&record.author_content_id);
            return;
        }

        inner.index(&record);
        let evicted = inner.records.push(record.author_content_id.clone(), record);

        let mut stats = self.stats.lock();
        stats.additions += 1;
        if let Some((_, old)) = evicted {
            inner.unindex(&old);
            stats.evictions += 1;
        }
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of records in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Clear all records from the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.proposals.clear();
        inner.votes.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn put(&self, record: &RelayedRecord) -> Result<()> {
        self.insert(Arc::new(record.clone()));
        Ok(())
    }

    async fn proposals(&self, token: &str) -> Result<Vec<Arc<RelayedRecord>>> {
        let inner = self.inner.lock();
        Ok(super::most_recent_first(
            inner.resolve(inner.proposals.get(token)),
        ))
    }

    async fn votes(&self, token: &str, proposal: &ContentId) -> Result<Vec<Arc<RelayedRecord>>> {
        let inner = self.inner.lock();
        let key = (token.to_string(), proposal.clone());
        Ok(inner.resolve(inner.votes.get(&key)))
    }

    async fn proposal(&self, token: &str, id: &ContentId) -> Result<Option<Arc<RelayedRecord>>> {
        let found = self
            .inner
            .lock()
            .records
            .get(id)
            .filter(|record| record.token() == token && record.proposal().is_some())
            .cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(found)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Arc<RelayedRecord>>> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .take(limit)
            .map(|(_, record)| Arc::clone(record))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::testing::{proposal_record, vote_record};

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = MemoryCache::new();
        let proposal = proposal_record("BAL", "p1", 100);

        assert!(cache.is_empty());
        assert!(cache
            .proposal("BAL", &proposal.author_content_id)
            .await
            .unwrap()
            .is_none());

        cache.put(&proposal).await.unwrap();
        assert_eq!(cache.len(), 1);
        let found = cache
            .proposal("BAL", &proposal.author_content_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.relay_content_id, proposal.relay_content_id);

        // Wrong token does not match
        assert!(cache
            .proposal("OTHER", &proposal.author_content_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = MemoryCache::new();
        let proposal = proposal_record("BAL", "p1", 100);

        cache
            .proposal("BAL", &proposal.author_content_id)
            .await
            .unwrap();
        cache.put(&proposal).await.unwrap();
        cache
            .proposal("BAL", &proposal.author_content_id)
            .await
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.additions, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_vote_lookup_is_not_a_proposal() {
        let cache = MemoryCache::new();
        let proposal = proposal_record("BAL", "p1", 100);
        let vote = vote_record("BAL", "v1", &proposal.author_content_id, "0xaaa", 150);
        cache.put(&vote).await.unwrap();

        assert!(cache
            .proposal("BAL", &vote.author_content_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            cache
                .votes("BAL", &proposal.author_content_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cache_lru_eviction_updates_indexes() {
        let cache = MemoryCache::with_capacity(2);

        let p1 = proposal_record("BAL", "p1", 100);
        let p2 = proposal_record("BAL", "p2", 200);
        let p3 = proposal_record("BAL", "p3", 300);

        cache.put(&p1).await.unwrap();
        cache.put(&p2).await.unwrap();
        cache.put(&p3).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);

        let listed = cache.proposals("BAL").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.author_content_id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2"]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_ignored() {
        let cache = MemoryCache::new();
        let proposal = proposal_record("BAL", "p1", 100);
        cache.put(&proposal).await.unwrap();
        cache.put(&proposal).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.proposals("BAL").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let cache = MemoryCache::new();
        cache.put(&proposal_record("BAL", "p1", 100)).await.unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.proposals("BAL").await.unwrap().is_empty());
    }
}
