//! Remote computation requests and their (possibly degraded) outputs

use crate::{LocationReference, RemoteError, utils};
use async_trait::async_trait;
use geo::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Default pixel scale of a computation, in meters
pub const DEFAULT_SCALE_M: f64 = 30.0;

/// Scale multiplier of the coarse-resolution fallback
pub const COARSE_SCALE_FACTOR: f64 = 4.0;

/// The remote geospatial compute service
///
/// The operation semantics (index math, compositing, statistics) are opaque here:
/// the service receives a resolved region plus the request and answers with JSON.
#[async_trait]
pub trait ComputeService: Send + Sync {
    async fn materialize(
        &self,
        region: &Geometry<f64>,
        request: &ComputeRequest,
    ) -> std::result::Result<Value, RemoteError>;
}

/// A computation over a named region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRequest {
    /// Location reference, resolved before the computation runs
    pub region: String,
    /// Remote operation name, e.g. `"ndvi_stats"`
    pub operation: String,
    /// Operation-specific parameters, passed through untouched
    #[serde(default)]
    pub params: Value,
    /// Pixel scale in meters
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Ask only for aggregate statistics instead of the full product
    #[serde(default)]
    pub summary_only: bool,
}

fn default_scale() -> f64 {
    DEFAULT_SCALE_M
}

impl ComputeRequest {
    /// Create a request with no parameters at the default scale
    pub fn new(region: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            operation: operation.into(),
            params: Value::Null,
            scale: DEFAULT_SCALE_M,
            summary_only: false,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Same request at a coarser resolution
    pub fn coarser(&self) -> Self {
        self.clone().with_scale(self.scale * COARSE_SCALE_FACTOR)
    }

    /// Same request asking only for a summary
    pub fn summary(&self) -> Self {
        Self {
            summary_only: true,
            ..self.clone()
        }
    }

    /// Content hash identifying this request in the result cache
    ///
    /// The region is keyed by its parsed canonical form, so every spelling that
    /// resolves through the same geometry cache entry shares a key. Parameter
    /// objects hash the same regardless of key order.
    pub fn cache_key(&self) -> String {
        utils::content_hash(&json!({
            "region": self.region_key(),
            "operation": self.operation,
            "params": self.params,
            "scale": self.scale,
            "summary_only": self.summary_only,
        }))
    }

    fn region_key(&self) -> String {
        match LocationReference::parse(&self.region) {
            // Inline geometries share a display name, so key them by their text
            LocationReference::Geometry(_) => utils::collapse_whitespace(&self.region),
            reference => utils::normalize_place_key(&reference.canonical_name()),
        }
    }
}

/// Answer to a request whose every attempt ran out of time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub operation: String,
    pub region: String,
    /// Why no result could be produced
    pub reason: String,
    /// What the caller can change to get a full result
    pub suggestion: String,
}

/// Result of [`crate::GeoFacade::compute`]
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOutput {
    /// A result from the primary attempt or one of its fallbacks
    Full(Value),
    /// Every attempt timed out
    Partial(PartialResult),
}

impl ComputeOutput {
    pub fn is_partial(&self) -> bool {
        matches!(self, ComputeOutput::Partial(_))
    }

    /// JSON form handed back to the tool-calling layer
    pub fn to_json(&self) -> Value {
        match self {
            ComputeOutput::Full(value) => json!({ "status": "complete", "result": value }),
            ComputeOutput::Partial(partial) => json!({
                "status": "partial",
                "operation": partial.operation,
                "region": partial.region,
                "reason": partial.reason,
                "suggestion": partial.suggestion,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_canonical() {
        let a = ComputeRequest::new("San Francisco", "ndvi_stats")
            .with_params(serde_json::from_str(r#"{"start":"2024-01-01","end":"2024-06-30"}"#).unwrap());
        let b = ComputeRequest::new("  san   francisco", "ndvi_stats")
            .with_params(serde_json::from_str(r#"{"end":"2024-06-30","start":"2024-01-01"}"#).unwrap());
        assert_eq!(a.cache_key(), b.cache_key());

        assert_ne!(a.cache_key(), a.coarser().cache_key());
        assert_ne!(a.cache_key(), a.summary().cache_key());
    }

    #[test]
    fn test_cache_key_follows_parsed_region() {
        let spaced = ComputeRequest::new("Paris, France", "ndvi");
        let tight = ComputeRequest::new("Paris,France", "ndvi");
        assert_eq!(spaced.cache_key(), tight.cache_key());

        let a = ComputeRequest::new(r#"{"type":"Point","coordinates":[0,0]}"#, "ndvi");
        let b = ComputeRequest::new(r#"{"type":"Point","coordinates":[1,1]}"#, "ndvi");
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_degraded_variants() {
        let request = ComputeRequest::new("Paris", "ndvi_stats").with_scale(10.0);
        assert_eq!(request.coarser().scale, 40.0);
        assert!(!request.coarser().summary_only);
        assert!(request.summary().summary_only);
        assert_eq!(request.summary().scale, 10.0);
    }

    #[test]
    fn test_request_from_json_defaults() {
        let request: ComputeRequest =
            serde_json::from_value(json!({ "region": "Texas", "operation": "elevation" })).unwrap();
        assert_eq!(request.scale, DEFAULT_SCALE_M);
        assert_eq!(request.params, Value::Null);
        assert!(!request.summary_only);
    }

    #[test]
    fn test_output_json() {
        let full = ComputeOutput::Full(json!({ "mean": 0.4 }));
        assert_eq!(full.to_json()["status"], "complete");
        assert!(!full.is_partial());

        let partial = ComputeOutput::Partial(PartialResult {
            operation: "ndvi_stats".to_string(),
            region: "Texas".to_string(),
            reason: "timed out".to_string(),
            suggestion: "use a smaller region".to_string(),
        });
        assert!(partial.is_partial());
        assert_eq!(partial.to_json()["status"], "partial");
        assert_eq!(partial.to_json()["region"], "Texas");
    }
}
