//! Resolved-place cache with hit counting and least-hit eviction

use super::{CacheStats, lock};
use crate::resolver::ResolvedBoundary;
use crate::utils;
use geo::{BoundingRect, Centroid, ChamberlainDuquetteArea, Geometry, Point, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Derived measurements of a resolved boundary, computed once at insertion
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundaryMetadata {
    /// Geodesic area in square kilometers
    pub area_km2: f64,
    /// Length of all polygon rings in kilometers
    pub perimeter_km: f64,
    /// Bounding box in WGS84 degrees (None for empty geometries)
    pub bounding_box: Option<Rect<f64>>,
    /// Centroid in WGS84 degrees (None for empty geometries)
    pub centroid: Option<Point<f64>>,
}

impl BoundaryMetadata {
    /// Measure a geometry
    pub fn from_geometry(geometry: &Geometry<f64>) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("geometry_cache::metadata");

        Self {
            area_km2: geometry.chamberlain_duquette_unsigned_area() / 1_000_000.0,
            perimeter_km: perimeter_m(geometry) / 1_000.0,
            bounding_box: geometry.bounding_rect(),
            centroid: geometry.centroid(),
        }
    }
}

fn perimeter_m(geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Polygon(polygon) => {
            utils::line_length_m(polygon.exterior())
                + polygon
                    .interiors()
                    .iter()
                    .map(utils::line_length_m)
                    .sum::<f64>()
        }
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .map(|p| perimeter_m(&Geometry::Polygon(p.clone())))
            .sum(),
        Geometry::GeometryCollection(gc) => gc.0.iter().map(perimeter_m).sum(),
        _ => 0.0,
    }
}

/// A cached resolution
#[derive(Debug, Clone)]
pub struct GeometryCacheEntry {
    /// Normalized place key
    pub key: String,
    pub boundary: ResolvedBoundary,
    pub metadata: BoundaryMetadata,
    /// Number of times this entry was served
    pub hits: u64,
    created_at: Instant,
}

impl GeometryCacheEntry {
    /// Time since the entry was inserted
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Observability snapshot of the geometry cache
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometryCacheStats {
    pub counters: CacheStats,
    /// `(key, hits)` for every live entry, most hit first
    pub entries: Vec<(String, u64)>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, GeometryCacheEntry>,
    stats: CacheStats,
}

/// Cache of resolved places keyed by normalized name
///
/// Unlike [`super::ResultCache`], eviction is frequency based: when full, the entry
/// with the fewest recorded hits goes (ties broken arbitrarily). The linear scan
/// is fine at the capacities this cache is used with.
#[derive(Debug)]
pub struct GeometryCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryCache {
    /// Create a cache holding at most `capacity` places (minimum 1) for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats {
                    capacity,
                    ..CacheStats::default()
                },
            }),
            capacity,
            ttl,
        }
    }

    /// Look up a place, counting a hit on success
    ///
    /// An expired entry is deleted as a side effect and `None` returned.
    pub fn get(&self, name: &str) -> Option<GeometryCacheEntry> {
        let key = utils::normalize_place_key(name);
        let mut inner = lock(&self.inner);

        let Some(expired) = inner
            .entries
            .get(&key)
            .map(|entry| entry.created_at.elapsed() >= self.ttl)
        else {
            inner.stats.misses += 1;
            return None;
        };

        if expired {
            inner.entries.remove(&key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            tracing::debug!("Geometry cache entry '{}' expired", key);
            return None;
        }

        inner.stats.hits += 1;
        let entry = inner.entries.get_mut(&key)?;
        entry.hits += 1;
        Some(entry.clone())
    }

    /// Store a resolution under the normalized form of `name`
    ///
    /// Replacing an existing key resets its hit count and age.
    pub fn set(&self, name: &str, boundary: ResolvedBoundary) {
        let key = utils::normalize_place_key(name);
        let metadata = BoundaryMetadata::from_geometry(&boundary.geometry);
        let mut inner = lock(&self.inner);

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            self.make_room(&mut inner);
        }

        inner.entries.insert(
            key.clone(),
            GeometryCacheEntry {
                key,
                boundary,
                metadata,
                hits: 0,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, then evict the least-hit entry if still full
    fn make_room(&self, inner: &mut Inner) {
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        inner.stats.expirations += (before - inner.entries.len()) as u64;

        if inner.entries.len() < self.capacity {
            return;
        }

        let victim = inner
            .entries
            .values()
            .min_by_key(|entry| entry.hits)
            .map(|entry| entry.key.clone());
        if let Some(victim) = victim {
            tracing::debug!("Evicting geometry cache entry '{}'", victim);
            inner.entries.remove(&victim);
            inner.stats.evictions += 1;
        }
    }

    /// Check whether a live entry exists, without counting a hit
    pub fn contains(&self, name: &str) -> bool {
        let key = utils::normalize_place_key(name);
        lock(&self.inner)
            .entries
            .get(&key)
            .is_some_and(|entry| entry.created_at.elapsed() < self.ttl)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries
    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }

    /// Counters plus every entry sorted by hit count, descending
    pub fn stats(&self) -> GeometryCacheStats {
        let inner = lock(&self.inner);
        let mut entries: Vec<(String, u64)> = inner
            .entries
            .values()
            .map(|entry| (entry.key.clone(), entry.hits))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        GeometryCacheStats {
            counters: CacheStats {
                entries: inner.entries.len(),
                ..inner.stats.clone()
            },
            entries,
        }
    }
}
