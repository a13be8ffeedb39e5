//! Configuration for the resolver and the query optimization layer

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the facade and all of its components
///
/// Every component is constructed from this struct by [`crate::GeoFacade::new`],
/// but each one can also be built standalone with its own parameters for tests.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Maximum number of resolved places kept in the geometry cache.
    /// Default: 100
    pub geometry_cache_capacity: usize,
    /// Lifetime of a resolved place in the geometry cache.
    /// Default: 1 hour
    pub geometry_cache_ttl: Duration,
    /// Maximum number of memoized remote results (probes and computations).
    /// Default: 500
    pub result_cache_capacity: usize,
    /// Lifetime of a memoized remote result.
    /// Default: 1 hour
    pub result_cache_ttl: Duration,
    /// Maximum number of remote calls in flight at once.
    /// Default: 3
    pub max_concurrent_requests: usize,
    /// Budget for a single boundary dataset probe before it counts as "no match".
    /// Default: 10 seconds
    pub probe_timeout: Duration,
    /// Budget for the primary (most precise) computation.
    /// Default: 5 seconds
    pub primary_timeout: Duration,
    /// Budget for each fallback computation.
    /// Default: 10 seconds
    pub fallback_timeout: Duration,
    /// Number of batch items executed in parallel per chunk.
    /// Default: 5
    pub batch_chunk_size: usize,
    /// Radius used to turn a bare coordinate pair into an area of interest.
    /// Default: 10 km
    pub point_buffer_meters: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Default for Config {
    fn default() -> Self {
        Self {
            geometry_cache_capacity: 100,
            geometry_cache_ttl: Duration::from_secs(60 * 60),
            result_cache_capacity: 500,
            result_cache_ttl: Duration::from_secs(60 * 60),
            max_concurrent_requests: 3,
            probe_timeout: Duration::from_secs(10),
            primary_timeout: Duration::from_secs(5),
            fallback_timeout: Duration::from_secs(10),
            batch_chunk_size: 5,
            point_buffer_meters: 10_000.0,
        }
    }
}
