//! GeoFacade - Composition root for place resolution and remote computations
//!
//! Owns one instance of every component, wired together from a single [`Config`]:
//! resolutions go through the geometry cache and the strategy cascade, remote
//! computations through the result cache, the request queue and the progressive
//! loader, and batches through a chunked batch processor.

use crate::batch::{BatchOutcome, BatchProcessor};
use crate::boundary::BoundaryStore;
use crate::cache::{CacheStats, GeometryCache, GeometryCacheStats, ResultCache};
use crate::compute::{ComputeOutput, ComputeRequest, ComputeService, PartialResult};
use crate::loader::{Fallback, ProgressiveLoader};
use crate::location::LocationReference;
use crate::queue::{QueueStats, RequestQueue};
use crate::resolver::{PlaceResolver, ProbeStats, ResolvedBoundary};
use crate::{Config, FacadeError, Result};
use futures::FutureExt;
use geo::Geometry;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry of a computation batch
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: String,
    pub request: ComputeRequest,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, request: ComputeRequest) -> Self {
        Self {
            id: id.into(),
            request,
        }
    }
}

/// Counters of every cache and of the request queue
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FacadeStats {
    pub geometry_cache: GeometryCacheStats,
    pub result_cache: CacheStats,
    pub probes: ProbeStats,
    pub queue: QueueStats,
}

/// Entry point for the tool-calling layer
pub struct GeoFacade {
    config: Config,
    resolver: PlaceResolver,
    geometry_cache: Arc<GeometryCache>,
    results: ResultCache<String, Value>,
    queue: Arc<RequestQueue>,
    loader: ProgressiveLoader,
    compute: Arc<dyn ComputeService>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeoFacade {
    /// Build every component from `config`
    pub fn new(
        config: Config,
        store: Arc<dyn BoundaryStore>,
        compute: Arc<dyn ComputeService>,
    ) -> Self {
        let geometry_cache = Arc::new(GeometryCache::new(
            config.geometry_cache_capacity,
            config.geometry_cache_ttl,
        ));
        let queue = Arc::new(RequestQueue::new(config.max_concurrent_requests));
        let resolver = PlaceResolver::new(store, geometry_cache.clone(), queue.clone(), &config);

        tracing::debug!(
            "Geo facade ready: {} concurrent requests, batch chunks of {}",
            queue.limit(),
            config.batch_chunk_size
        );

        Self {
            resolver,
            geometry_cache,
            results: ResultCache::new(config.result_cache_capacity, config.result_cache_ttl),
            queue,
            loader: ProgressiveLoader::new(config.primary_timeout, config.fallback_timeout),
            compute,
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve a free-form location string to its geometry
    pub async fn resolve_location(&self, reference: &str) -> Result<Arc<Geometry<f64>>> {
        Ok(self.resolver.resolve(reference).await?.geometry)
    }

    /// Resolve a structured location (GeoJSON object, `[lon, lat]` or string)
    pub async fn resolve_location_json(&self, reference: &Value) -> Result<Arc<Geometry<f64>>> {
        // Strings keep their exact spelling for error reporting
        if let Value::String(input) = reference {
            return self.resolve_location(input).await;
        }
        let reference = LocationReference::from_json(reference)?;
        Ok(self.resolver.resolve_reference(&reference).await?.geometry)
    }

    /// Resolve a free-form location string, keeping its provenance
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedBoundary> {
        self.resolver.resolve(reference).await
    }

    /// Resolve an already parsed reference
    pub async fn resolve_reference(&self, reference: &LocationReference) -> Result<ResolvedBoundary> {
        self.resolver.resolve_reference(reference).await
    }

    /// Run a computation over a named region
    ///
    /// The request is tried at full precision first, then at a coarser scale,
    /// then as a summary only. If all of them run out of time the caller gets a
    /// [`ComputeOutput::Partial`] instead of an error; any other failure of the
    /// primary attempt (resolution, auth, quota…) is returned unchanged.
    pub async fn compute(&self, request: ComputeRequest) -> Result<ComputeOutput> {
        if let Some(value) = self.results.get(&request.cache_key()) {
            tracing::debug!("'{}' on '{}' served from result cache", request.operation, request.region);
            return Ok(ComputeOutput::Full(value));
        }

        let region = self.resolver.resolve(&request.region).await?.geometry;

        let fallbacks: Vec<Fallback<'_, Value>> = [request.coarser(), request.summary()]
            .into_iter()
            .map(|degraded| {
                let region = region.clone();
                Box::new(move || self.materialize(region.clone(), degraded.clone()).boxed())
                    as Fallback<'_, Value>
            })
            .collect();

        let primary = self.materialize(region, request.clone());
        match self.loader.run(&request.operation, primary, &fallbacks).await {
            Ok(value) => Ok(ComputeOutput::Full(value)),
            Err(err) if err.is_timeout() => {
                tracing::warn!(
                    "'{}' on '{}' degraded to a partial result: {}",
                    request.operation,
                    request.region,
                    err
                );
                Ok(ComputeOutput::Partial(PartialResult {
                    operation: request.operation.clone(),
                    region: request.region.clone(),
                    reason: err.to_string(),
                    suggestion: "Try a smaller region, a shorter time range or a coarser scale"
                        .to_string(),
                }))
            }
            Err(err) => {
                tracing::warn!("'{}' on '{}' failed: {}", request.operation, request.region, err);
                Err(err)
            }
        }
    }

    /// One queued, memoized remote materialization
    ///
    /// Each degraded variant of a request has its own cache key, so a coarse
    /// fallback result never answers a later full-precision request.
    async fn materialize(&self, region: Arc<Geometry<f64>>, request: ComputeRequest) -> Result<Value> {
        let key = request.cache_key();
        if let Some(value) = self.results.get(&key) {
            return Ok(value);
        }

        let value = self
            .queue
            .add(|| self.compute.materialize(&region, &request))
            .await
            .map_err(FacadeError::from)?;
        self.results.set(key, value.clone());
        Ok(value)
    }

    /// Run several computations, chunked, isolating failures per item
    pub async fn run_batch(
        &self,
        items: Vec<BatchItem>,
    ) -> Result<HashMap<String, BatchOutcome<ComputeOutput>>> {
        let processor = BatchProcessor::new(self.config.batch_chunk_size);
        for item in items {
            processor.add(item.id, self.compute(item.request));
        }
        processor.process().await
    }

    /// Resolve several location strings, chunked, isolating failures per item
    ///
    /// Each input is its own id in the returned map.
    pub async fn resolve_batch<I, S>(
        &self,
        references: I,
    ) -> Result<HashMap<String, BatchOutcome<ResolvedBoundary>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let processor = BatchProcessor::new(self.config.batch_chunk_size);
        for reference in references {
            let reference = reference.into();
            let input = reference.clone();
            processor.add(reference, async move { self.resolver.resolve(&input).await });
        }
        processor.process().await
    }

    /// Statistics of every cache and of the request queue
    pub fn cache_stats(&self) -> FacadeStats {
        FacadeStats {
            geometry_cache: self.geometry_cache.stats(),
            result_cache: self.results.stats(),
            probes: self.resolver.stats(),
            queue: self.queue.stats(),
        }
    }

    /// Drop every cached resolution, probe outcome and computation result
    pub fn clear_caches(&self) {
        self.geometry_cache.clear();
        self.results.clear();
        self.resolver.clear_probe_memo();
        tracing::info!("Cleared all caches");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemoteError;
    use crate::boundary::{BoundaryFeature, Dataset, InMemoryBoundaryStore};
    use async_trait::async_trait;
    use geo::Rect;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers after a delay that depends on the requested precision
    #[derive(Default)]
    struct ScaledService {
        full_delay: Duration,
        coarse_delay: Duration,
        summary_delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ComputeService for ScaledService {
        async fn materialize(
            &self,
            _region: &Geometry<f64>,
            request: &ComputeRequest,
        ) -> std::result::Result<Value, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.operation == "forbidden" {
                return Err(RemoteError::Auth("token expired".to_string()));
            }
            let delay = if request.summary_only {
                self.summary_delay
            } else if request.scale > crate::compute::DEFAULT_SCALE_M {
                self.coarse_delay
            } else {
                self.full_delay
            };
            tokio::time::sleep(delay).await;
            Ok(json!({ "scale": request.scale, "summary": request.summary_only }))
        }
    }

    fn store() -> Arc<InMemoryBoundaryStore> {
        let texas = Rect::new((-106.0, 26.0), (-94.0, 36.0)).to_polygon();
        Arc::new(InMemoryBoundaryStore::new().with_feature(BoundaryFeature::named(
            Dataset::UsStates,
            "Texas",
            Geometry::Polygon(texas),
        )))
    }

    fn facade(service: ScaledService) -> (GeoFacade, Arc<ScaledService>) {
        let service = Arc::new(service);
        (
            GeoFacade::new(Config::default(), store(), service.clone()),
            service,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_compute_full_and_cached() {
        let (facade, service) = facade(ScaledService::default());
        let request = ComputeRequest::new("Texas", "ndvi_stats");

        let output = facade.compute(request.clone()).await.unwrap();
        assert_eq!(output, ComputeOutput::Full(json!({ "scale": 30.0, "summary": false })));

        facade.compute(request).await.unwrap();
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(facade.cache_stats().result_cache.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compute_falls_back_to_coarse_scale() {
        let (facade, _) = facade(ScaledService {
            full_delay: Duration::from_secs(60),
            coarse_delay: Duration::from_secs(1),
            ..ScaledService::default()
        });

        let output = facade
            .compute(ComputeRequest::new("Texas", "ndvi_stats"))
            .await
            .unwrap();
        assert_eq!(output, ComputeOutput::Full(json!({ "scale": 120.0, "summary": false })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compute_times_out_to_partial() {
        let (facade, _) = facade(ScaledService {
            full_delay: Duration::from_secs(60),
            coarse_delay: Duration::from_secs(60),
            summary_delay: Duration::from_secs(60),
            ..ScaledService::default()
        });

        let output = facade
            .compute(ComputeRequest::new("Texas", "ndvi_stats"))
            .await
            .unwrap();
        match output {
            ComputeOutput::Partial(partial) => {
                assert_eq!(partial.region, "Texas");
                assert!(partial.reason.contains("timed out"));
            }
            other => panic!("expected a partial result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_and_resolution_errors_pass_through() {
        let (facade, _) = facade(ScaledService::default());

        let err = facade
            .compute(ComputeRequest::new("Texas", "forbidden"))
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::Remote(RemoteError::Auth(_))));

        let err = facade
            .compute(ComputeRequest::new("Atlantis", "ndvi_stats"))
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_location_json() {
        let (facade, _) = facade(ScaledService::default());
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        });
        let geometry = facade.resolve_location_json(&polygon).await.unwrap();
        assert!(matches!(*geometry, Geometry::Polygon(_)));

        let texas = facade.resolve_location_json(&json!("texas")).await.unwrap();
        assert!(matches!(*texas, Geometry::Polygon(_)));
        assert!(facade.resolve_location_json(&json!(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_json_string_echoes_exact_input() {
        let (facade, _) = facade(ScaledService::default());
        let err = facade
            .resolve_location_json(&json!("  Nowhere   Land "))
            .await
            .unwrap_err();
        match err {
            FacadeError::NotFound { input } => assert_eq!(input, "  Nowhere   Land "),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_region_spellings_share_one_computation() {
        let (facade, service) = facade(ScaledService::default());
        facade
            .compute(ComputeRequest::new("Texas, USA", "ndvi_stats"))
            .await
            .unwrap();
        facade
            .compute(ComputeRequest::new("Texas,USA", "ndvi_stats"))
            .await
            .unwrap();
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(facade.cache_stats().result_cache.hits, 1);
    }

    #[tokio::test]
    async fn test_clear_caches() {
        let (facade, _) = facade(ScaledService::default());
        facade.resolve("Texas").await.unwrap();
        facade
            .compute(ComputeRequest::new("Texas", "ndvi_stats"))
            .await
            .unwrap();

        let stats = facade.cache_stats();
        assert_eq!(stats.geometry_cache.counters.entries, 1);
        assert_eq!(stats.result_cache.entries, 1);
        assert!(stats.probes.memo.entries > 0);

        facade.clear_caches();
        let stats = facade.cache_stats();
        assert_eq!(stats.geometry_cache.counters.entries, 0);
        assert_eq!(stats.result_cache.entries, 0);
        assert_eq!(stats.probes.memo.entries, 0);
    }
}
