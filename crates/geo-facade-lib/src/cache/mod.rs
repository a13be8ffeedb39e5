//! Caches in front of the remote service
//!
//! Two caches with deliberately different eviction policies:
//!
//! - [`ResultCache`]: generic memoization of remote materializations, keyed by a
//!   content hash or probe key, with true LRU eviction.
//! - [`GeometryCache`]: resolved places keyed by normalized name, evicting the
//!   entry with the fewest hits.
//!
//! Both expire entries lazily after a fixed TTL. Neither ever returns an error: a
//! missing or stale entry is simply `None`.

mod geometry;
mod result;

pub use geometry::{BoundaryMetadata, GeometryCache, GeometryCacheEntry, GeometryCacheStats};
pub use result::ResultCache;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Hit/miss counters for a cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CacheStats {
    /// Live entries (possibly including expired ones not yet purged)
    pub entries: usize,
    /// Maximum number of entries
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for new ones
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 when there were none)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
///
/// Cache contents stay consistent across a panic (every mutation is a single map
/// operation), so a poisoned lock is safe to keep using.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.hits = 3;
        stats.misses = 1;
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
