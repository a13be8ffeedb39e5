//! Generic TTL + LRU result cache

use super::{CacheStats, lock};
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct TimedValue<V> {
    value: V,
    created_at: Instant,
}

#[derive(Debug)]
struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, TimedValue<V>>,
    stats: CacheStats,
}

/// Size-bounded memoization of expensive remote calls
///
/// Every successful `get` moves the entry to the most-recently-used position, and
/// inserting into a full cache evicts the least recently used entry (after first
/// purging anything whose TTL already elapsed).
#[derive(Debug)]
pub struct ResultCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<K: Hash + Eq + Clone, V: Clone> ResultCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1) for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..CacheStats::default()
                },
            }),
            ttl,
        }
    }

    /// Look up a value, refreshing its recency
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = lock(&self.inner);
        let now = Instant::now();

        let lookup = inner
            .entries
            .get(key)
            .map(|entry| (now.duration_since(entry.created_at) < self.ttl, entry.value.clone()));

        match lookup {
            Some((true, value)) => {
                inner.stats.hits += 1;
                Some(value)
            }
            Some((false, _)) => {
                inner.entries.pop(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a value
    pub fn set(&self, key: K, value: V) {
        let mut inner = lock(&self.inner);
        let now = Instant::now();

        if !inner.entries.contains(&key) && inner.entries.len() >= inner.entries.cap().get() {
            let expired: Vec<K> = inner
                .entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.created_at) >= self.ttl)
                .map(|(k, _)| k.clone())
                .collect();
            for k in &expired {
                inner.entries.pop(k);
            }
            inner.stats.expirations += expired.len() as u64;
        }

        let evicted = inner.entries.push(
            key,
            TimedValue {
                value,
                created_at: now,
            },
        );
        // `push` also returns the old value when replacing the same key
        if let Some((evicted_key, _)) = evicted {
            if inner.entries.peek(&evicted_key).is_none() {
                inner.stats.evictions += 1;
            }
        }
    }

    /// Check for a live entry without touching recency or counters
    pub fn contains(&self, key: &K) -> bool {
        let inner = lock(&self.inner);
        inner
            .entries
            .peek(key)
            .is_some_and(|entry| entry.created_at.elapsed() < self.ttl)
    }

    /// Number of stored entries (expired ones are counted until purged)
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries, keeping the counters
    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats.clone()
        }
    }
}
