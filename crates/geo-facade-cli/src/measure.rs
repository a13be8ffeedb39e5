//! Local stand-in for the remote compute service
//!
//! Answers a handful of measurement operations directly from the resolved
//! geometry, so the full compute path (cache, queue, fallbacks) can be driven
//! from the command line without remote credentials.

use async_trait::async_trait;
use geo::Geometry;
use geo_facade_lib::{BoundaryMetadata, ComputeRequest, ComputeService, RemoteError};
use serde_json::{Value, json};

/// Operations understood by [`LocalMeasurements`]
pub const OPERATIONS: [&str; 5] = ["area", "perimeter", "bbox", "centroid", "summary"];

pub struct LocalMeasurements;

#[async_trait]
impl ComputeService for LocalMeasurements {
    async fn materialize(
        &self,
        region: &Geometry<f64>,
        request: &ComputeRequest,
    ) -> Result<Value, RemoteError> {
        let metadata = BoundaryMetadata::from_geometry(region);
        let bbox = metadata
            .bounding_box
            .map(|r| json!([r.min().x, r.min().y, r.max().x, r.max().y]));
        let centroid = metadata.centroid.map(|c| json!([c.x(), c.y()]));

        if request.summary_only {
            return Ok(json!({ "area_km2": metadata.area_km2 }));
        }

        match request.operation.as_str() {
            "area" => Ok(json!({ "area_km2": metadata.area_km2 })),
            "perimeter" => Ok(json!({ "perimeter_km": metadata.perimeter_km })),
            "bbox" => Ok(json!({ "bbox": bbox })),
            "centroid" => Ok(json!({ "centroid": centroid })),
            "summary" => Ok(json!({
                "area_km2": metadata.area_km2,
                "perimeter_km": metadata.perimeter_km,
                "bbox": bbox,
                "centroid": centroid,
            })),
            other => Err(RemoteError::MalformedQuery(format!(
                "unknown operation '{other}', expected one of {}",
                OPERATIONS.join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Rect;

    fn square() -> Geometry<f64> {
        Geometry::Polygon(Rect::new((0.0, 0.0), (1.0, 1.0)).to_polygon())
    }

    #[tokio::test]
    async fn test_operations() {
        let bbox = LocalMeasurements
            .materialize(&square(), &ComputeRequest::new("square", "bbox"))
            .await
            .unwrap();
        assert_eq!(bbox, json!({ "bbox": [0.0, 0.0, 1.0, 1.0] }));

        let summary = LocalMeasurements
            .materialize(&square(), &ComputeRequest::new("square", "summary"))
            .await
            .unwrap();
        assert!(summary["area_km2"].as_f64().unwrap() > 12_000.0);
        let centroid = summary["centroid"].as_array().unwrap();
        assert!((centroid[0].as_f64().unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let err = LocalMeasurements
            .materialize(&square(), &ComputeRequest::new("square", "ndvi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::MalformedQuery(_)));

        // The summary-only fallback still answers
        let summary = ComputeRequest::new("square", "ndvi").summary();
        assert!(LocalMeasurements.materialize(&square(), &summary).await.is_ok());
    }
}
