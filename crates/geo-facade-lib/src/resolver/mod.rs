//! Place resolution: the ordered strategy cascade
//!
//! A reference is resolved by the first strategy that produces a boundary:
//!
//! 1. structural parse (coordinates, inline GeoJSON), no dataset access
//! 2. contextual split ("Paris, France") with a combined attribute filter
//! 3. exact-match sweep over the prioritized dataset list, in three casings
//! 4. known-alias lookup
//! 5. administrative suffix stripping
//! 6. token partial match, accepting only unambiguous hits
//!
//! Every dataset probe goes through the shared [`RequestQueue`] and is memoized,
//! negative outcomes included, so repeated lookups of unknown names stay cheap.
//! Strategies never fail: an error or timeout of a probe simply counts as "no
//! match" and the cascade moves on.

mod strategies;

pub use strategies::{Alias, casing_variants, lookup_alias, significant_tokens, strip_admin_suffix};

use crate::boundary::{BoundaryStore, Dataset, DatasetQuery, EXACT_MATCH_TARGETS, ProbeTarget};
use crate::cache::{CacheStats, GeometryCache, ResultCache};
use crate::location::LocationReference;
use crate::queue::RequestQueue;
use crate::{Config, FacadeError, Result, utils};
use geo::{Geometry, Point};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Which cascade step produced a boundary
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strategy {
    Structural,
    Contextual,
    ExactMatch,
    Alias,
    SuffixStripped,
    TokenPartial,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Structural => "structural",
            Strategy::Contextual => "contextual",
            Strategy::ExactMatch => "exact_match",
            Strategy::Alias => "alias",
            Strategy::SuffixStripped => "suffix_stripped",
            Strategy::TokenPartial => "token_partial",
        };
        f.write_str(name)
    }
}

/// Where a resolved boundary came from
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Provenance {
    /// Source dataset (None for structural references)
    pub dataset: Option<Dataset>,
    /// Administrative level of the matched feature
    pub admin_level: Option<u8>,
    /// The exact attribute value that matched, or a description of the input
    pub matched_name: String,
    pub strategy: Strategy,
}

/// A place reference turned into a concrete boundary
///
/// The geometry is shared read-only between the caches and every caller.
#[derive(Clone, Debug)]
pub struct ResolvedBoundary {
    pub geometry: Arc<Geometry<f64>>,
    pub provenance: Provenance,
}

/// Positive probe outcome
#[derive(Clone, Debug)]
struct ProbeHit {
    /// Number of matching features (the geometry is the first one's)
    count: usize,
    geometry: Arc<Geometry<f64>>,
}

/// Resolver statistics
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProbeStats {
    /// Probes that reached the boundary store
    pub remote_probes: u64,
    /// Probes that failed or timed out
    pub failed_probes: u64,
    /// Memoized probe outcomes
    pub memo: CacheStats,
}

/// Ordered cascade of resolution strategies over a [`BoundaryStore`]
pub struct PlaceResolver {
    store: Arc<dyn BoundaryStore>,
    geometry_cache: Arc<GeometryCache>,
    queue: Arc<RequestQueue>,
    probe_cache: ResultCache<String, Option<ProbeHit>>,
    probe_timeout: Duration,
    point_buffer_meters: f64,
    remote_probes: AtomicU64,
    failed_probes: AtomicU64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PlaceResolver {
    /// Create a resolver sharing the given geometry cache and request queue
    ///
    /// The probe memo is sized from the result cache settings of `config`.
    pub fn new(
        store: Arc<dyn BoundaryStore>,
        geometry_cache: Arc<GeometryCache>,
        queue: Arc<RequestQueue>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            geometry_cache,
            queue,
            probe_cache: ResultCache::new(config.result_cache_capacity, config.result_cache_ttl),
            probe_timeout: config.probe_timeout,
            point_buffer_meters: config.point_buffer_meters,
            remote_probes: AtomicU64::new(0),
            failed_probes: AtomicU64::new(0),
        }
    }

    /// Parse and resolve a free-form location string
    pub async fn resolve(&self, input: &str) -> Result<ResolvedBoundary> {
        let reference = LocationReference::parse(input);
        self.resolve_as(&reference, input).await
    }

    /// Resolve an already parsed reference
    pub async fn resolve_reference(&self, reference: &LocationReference) -> Result<ResolvedBoundary> {
        let input = reference.canonical_name();
        self.resolve_as(reference, &input).await
    }

    async fn resolve_as(
        &self,
        reference: &LocationReference,
        input: &str,
    ) -> Result<ResolvedBoundary> {
        let (primary, context) = match reference {
            LocationReference::Coordinates { lon, lat } => {
                let geometry = utils::buffer_point(Point::new(*lon, *lat), self.point_buffer_meters);
                return Ok(structural(Geometry::Polygon(geometry), input));
            }
            LocationReference::Geometry(Geometry::Point(point)) => {
                let geometry = utils::buffer_point(*point, self.point_buffer_meters);
                return Ok(structural(Geometry::Polygon(geometry), input));
            }
            LocationReference::Geometry(geometry) => {
                return Ok(structural(geometry.clone(), input));
            }
            LocationReference::PlaceName(name) => (name.as_str(), None),
            LocationReference::PlaceWithContext { primary, context } => {
                (primary.as_str(), Some(context.as_str()))
            }
        };

        if primary.is_empty() {
            return Err(FacadeError::NotFound {
                input: input.to_string(),
            });
        }

        let key = reference.canonical_name();
        if let Some(entry) = self.geometry_cache.get(&key) {
            tracing::debug!("Resolved '{}' from geometry cache ({} hits)", input, entry.hits);
            return Ok(entry.boundary);
        }

        let Some(boundary) = self.cascade(primary, context).await else {
            tracing::info!("No strategy matched '{}'", input);
            return Err(FacadeError::NotFound {
                input: input.to_string(),
            });
        };

        tracing::info!(
            "Resolved '{}' via {} ({} = '{}')",
            input,
            boundary.provenance.strategy,
            boundary
                .provenance
                .dataset
                .map(|d| d.id())
                .unwrap_or("inline"),
            boundary.provenance.matched_name
        );
        self.geometry_cache.set(&key, boundary.clone());
        Ok(boundary)
    }

    /// Steps 2 to 6; the first strategy producing a boundary wins
    async fn cascade(&self, primary: &str, context: Option<&str>) -> Option<ResolvedBoundary> {
        if let Some(context) = context {
            if let Some(found) = self.contextual(primary, context).await {
                return Some(found);
            }
        }

        if let Some(found) = self.sweep(primary, Strategy::ExactMatch, false).await {
            return Some(found);
        }

        if let Some(alias) = lookup_alias(primary) {
            if let Some(found) = self.alias(alias).await {
                return Some(found);
            }
        }

        if let Some(stem) = strip_admin_suffix(primary) {
            if let Some(found) = self.sweep(stem, Strategy::SuffixStripped, false).await {
                return Some(found);
            }
        }

        for token in significant_tokens(primary) {
            if let Some(found) = self.sweep(token, Strategy::TokenPartial, true).await {
                return Some(found);
            }
        }

        None
    }

    /// Combined `name AND parent` filters: district in country, district in
    /// state/province, then province in country
    async fn contextual(&self, primary: &str, context: &str) -> Option<ResolvedBoundary> {
        let district = ProbeTarget::name_of(Dataset::GaulLevel2, "ADM2_NAME", 2);
        let province = ProbeTarget::name_of(Dataset::GaulLevel1, "ADM1_NAME", 1);
        let combinations = [
            (district, "ADM0_NAME"),
            (district, "ADM1_NAME"),
            (province, "ADM0_NAME"),
        ];

        let names = casing_variants(primary);
        let contexts = casing_variants(context);
        for (target, parent_attribute) in combinations {
            for name in &names {
                for parent in &contexts {
                    let query = target.query(name).filter(parent_attribute, parent);
                    if let Some(hit) = self.probe(query).await {
                        return Some(found(hit, target, name, Strategy::Contextual));
                    }
                }
            }
        }
        None
    }

    /// Try every casing of `name` against the prioritized dataset list
    async fn sweep(&self, name: &str, strategy: Strategy, unique: bool) -> Option<ResolvedBoundary> {
        for variant in casing_variants(name) {
            for target in EXACT_MATCH_TARGETS {
                let Some(hit) = self.probe(target.query(&variant)).await else {
                    continue;
                };
                if unique && hit.count != 1 {
                    tracing::debug!(
                        "Skipping ambiguous partial match '{}' in {} ({} features)",
                        variant,
                        target.dataset,
                        hit.count
                    );
                    continue;
                }
                return Some(found(hit, target, &variant, strategy));
            }
        }
        None
    }

    /// Probe the alias's canonical entry, then sweep the canonical name
    async fn alias(&self, alias: Alias) -> Option<ResolvedBoundary> {
        if let Some(hit) = self.probe(alias.target.query(alias.canonical)).await {
            return Some(found(hit, alias.target, alias.canonical, Strategy::Alias));
        }
        self.sweep(alias.canonical, Strategy::Alias, false).await
    }

    /// One memoized `count` + `first_geometry` round trip
    ///
    /// Only definitive answers are memoized (a match or zero features). Failed or
    /// timed-out probes are reported as "no match" but retried on the next call.
    async fn probe(&self, query: DatasetQuery) -> Option<ProbeHit> {
        let key = query.cache_key();
        if let Some(memoized) = self.probe_cache.get(&key) {
            return memoized;
        }

        self.remote_probes.fetch_add(1, Ordering::Relaxed);
        let budget = self.probe_timeout;
        let outcome = self
            .queue
            .add(|| tokio::time::timeout(budget, self.fetch(&query)))
            .await;

        match outcome {
            Ok(Ok(hit)) => {
                tracing::debug!(
                    "Probe {}: {}",
                    key,
                    hit.as_ref()
                        .map_or("no match".to_string(), |h| format!("{} feature(s)", h.count))
                );
                self.probe_cache.set(key, hit.clone());
                hit
            }
            Ok(Err(err)) => {
                self.failed_probes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Probe {} failed: {}", key, err);
                None
            }
            Err(_) => {
                self.failed_probes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Probe {} timed out after {:?}", key, budget);
                None
            }
        }
    }

    async fn fetch(&self, query: &DatasetQuery) -> Result<Option<ProbeHit>> {
        let count = self.store.count(query).await?;
        if count == 0 {
            return Ok(None);
        }
        let geometry = self.store.first_geometry(query).await?;
        Ok(geometry.map(|geometry| ProbeHit {
            count,
            geometry: Arc::new(geometry),
        }))
    }

    /// Probe counters and memo statistics
    pub fn stats(&self) -> ProbeStats {
        ProbeStats {
            remote_probes: self.remote_probes.load(Ordering::Relaxed),
            failed_probes: self.failed_probes.load(Ordering::Relaxed),
            memo: self.probe_cache.stats(),
        }
    }

    /// Forget every memoized probe outcome
    pub fn clear_probe_memo(&self) {
        self.probe_cache.clear();
    }
}

fn structural(geometry: Geometry<f64>, input: &str) -> ResolvedBoundary {
    ResolvedBoundary {
        geometry: Arc::new(geometry),
        provenance: Provenance {
            dataset: None,
            admin_level: None,
            matched_name: input.to_string(),
            strategy: Strategy::Structural,
        },
    }
}

fn found(hit: ProbeHit, target: ProbeTarget, name: &str, strategy: Strategy) -> ResolvedBoundary {
    ResolvedBoundary {
        geometry: hit.geometry,
        provenance: Provenance {
            dataset: Some(target.dataset),
            admin_level: Some(target.level),
            matched_name: name.to_string(),
            strategy,
        },
    }
}
