//! LRU cache of ranked results keyed by user.
//!
//! Recency is refreshed by both `get` and `put`, so the entry evicted on
//! overflow is the one least recently touched, not the oldest insert.
//! The cache sits behind a mutex so one serving state can be shared by
//! parallel workers; the counters are atomics and readable without the lock.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

pub struct ResultCache {
    /// `None` when capacity is zero
    inner: Option<Mutex<LruCache<String, Vec<u32>>>>,
    counters: Counters,
}

impl ResultCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            counters: Counters::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map(|c| c.lock().cap().get()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached result for `key`, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<Vec<u32>> {
        let hit = self
            .inner
            .as_ref()
            .and_then(|cache| cache.lock().get(key).cloned());

        let counter = if hit.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Insert or refresh `key`, evicting the least recently touched entry if full.
    pub fn put(&self, key: &str, result: Vec<u32>) {
        let Some(cache) = &self.inner else {
            return;
        };
        let mut cache = cache.lock();
        // `push` hands back the evicted entry; a same-key replacement is not an eviction
        if let Some((evicted, _)) = cache.push(key.to_string(), result) {
            if evicted != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Evicted cached result for {:?}", evicted);
            }
        }
    }

    /// Whether `key` is cached, without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .as_ref()
            .map(|c| c.lock().contains(key))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.lock().clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity(),
        }
    }
}
