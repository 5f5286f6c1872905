//! Per-request memoization of index query results.
//!
//! A cache belongs to one logical request. Keys embed the index's generation
//! counter, so any mutation of the index makes its older entries unreachable
//! without explicit eviction.

use crate::index::postings::PostingSet;
use crate::index::types::DEFAULT_CACHE_CAPACITY;
use ahash::RandomState;
use lru::LruCache;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

/// Identifies one query against one state of one index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Index kind, id and generation
    pub index: String,
    /// Canonical form of the query record
    pub record: String,
}

impl CacheKey {
    pub fn new(kind: &str, id: &str, generation: u64, record: String) -> Self {
        Self {
            index: format!("_{}_{}_{}", kind, id, generation),
            record,
        }
    }
}

/// Hit/miss/set counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

pub struct RequestCache {
    entries: LruCache<CacheKey, PostingSet, RandomState>,
    stats: CacheStats,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::with_hasher(capacity, RandomState::new()),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<PostingSet> {
        match self.entries.get(key) {
            Some(set) => {
                self.stats.hits += 1;
                Some(set.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, set: PostingSet) {
        self.entries.put(key, set);
        self.stats.sets += 1;
    }

    /// Drop all entries and reset the counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<RequestCache {} items (hits: {}, misses: {}, sets: {})>",
            self.len(),
            self.stats.hits,
            self.stats.misses,
            self.stats.sets
        )
    }
}
