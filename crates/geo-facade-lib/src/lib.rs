//! Geo Facade Library - Place Resolution and Query Optimization
//!
//! This library sits between a tool-calling layer and a remote geospatial compute
//! service. It turns human-friendly location references into exact boundaries and
//! shields callers from the remote service's latency and instability.
//!
//! # Architecture
//!
//! - **[`PlaceResolver`]**: Ordered cascade of resolution strategies over boundary datasets
//! - **[`GeometryCache`]**: Place name to resolved boundary, evicting the least-hit entry
//! - **[`ResultCache`]**: Generic TTL + LRU memoization of expensive remote calls
//! - **[`RequestQueue`]**: FIFO, bounded-concurrency admission control
//! - **[`ProgressiveLoader`]**: Timeout-raced execution with cheaper fallbacks
//! - **[`BatchProcessor`]**: Chunked parallel execution with per-item failure isolation
//! - **[`GeoFacade`]**: Composition root owning all of the above
//!
//! # Data Flow
//!
//! reference → `GeometryCache` → (miss) strategy cascade → `RequestQueue` →
//! [`BoundaryStore`] probes memoized in `ResultCache` → resolved geometry →
//! [`ComputeService`] via `ProgressiveLoader` → batches fan out through `BatchProcessor`.

mod batch;
pub mod boundary;
pub mod cache;
mod compute;
mod config;
mod facade;
mod loader;
mod location;
mod queue;
pub mod resolver;
pub mod utils;

// Public API exports
pub use batch::{BatchItemError, BatchOutcome, BatchProcessor};
pub use boundary::{BoundaryFeature, BoundaryStore, Dataset, DatasetQuery, InMemoryBoundaryStore};
pub use cache::{
    BoundaryMetadata, CacheStats, GeometryCache, GeometryCacheEntry, GeometryCacheStats, ResultCache,
};
pub use compute::{ComputeOutput, ComputeRequest, ComputeService, PartialResult};
pub use config::Config;
pub use facade::{BatchItem, FacadeStats, GeoFacade};
pub use loader::{Fallback, ProgressiveLoader};
pub use location::{LocationReference, geometry_from_geojson, geometry_to_geojson};
pub use queue::{QueueStats, RequestQueue};
pub use resolver::{PlaceResolver, ProbeStats, Provenance, ResolvedBoundary, Strategy};

use std::time::Duration;

/// Errors reported by the remote geospatial service or the boundary datasets.
///
/// These are passed through unchanged to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Error types for the facade
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("Location not found: '{input}' (try adding a state or country, e.g. 'Paris, France')")]
    NotFound { input: String },

    #[error("Operation '{operation}' timed out after {budget:?}")]
    Timeout {
        operation: String,
        budget: Duration,
    },

    #[error("A batch is already being processed")]
    ConcurrentBatch,

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FacadeError {
    /// Whether this error is a timeout of some remote operation
    pub fn is_timeout(&self) -> bool {
        matches!(self, FacadeError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, FacadeError>;
