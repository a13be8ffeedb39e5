//! In-memory boundary store backed by GeoJSON feature collections

use super::{BoundaryStore, Dataset, DatasetQuery};
use crate::location::geometry_from_geojson;
use crate::{FacadeError, RemoteError, Result};
use async_trait::async_trait;
use geo::Geometry;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single boundary feature with string attributes
#[derive(Clone, Debug)]
pub struct BoundaryFeature {
    pub dataset: Dataset,
    pub properties: HashMap<String, String>,
    pub geometry: Geometry<f64>,
}

impl BoundaryFeature {
    /// Create a feature whose name attribute is set to `name`
    pub fn named(dataset: Dataset, name: &str, geometry: Geometry<f64>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(dataset.name_attribute().to_string(), name.to_string());
        Self {
            dataset,
            properties,
            geometry,
        }
    }

    /// Add an extra attribute (e.g. the parent country of a district)
    pub fn with_property(mut self, attribute: &str, value: &str) -> Self {
        self.properties
            .insert(attribute.to_string(), value.to_string());
        self
    }

    fn matches(&self, query: &DatasetQuery) -> bool {
        self.dataset == query.dataset
            && query
                .filters
                .iter()
                .all(|(attribute, value)| self.properties.get(attribute) == Some(value))
    }
}

/// Boundary store holding every feature in memory
///
/// Matching is exact and case-sensitive, like the remote datasets. Every `count`
/// and `first_geometry` call increments a probe counter, which makes it easy to
/// assert how many remote round trips a resolution would have cost.
#[derive(Debug, Default)]
pub struct InMemoryBoundaryStore {
    features: Vec<BoundaryFeature>,
    probes: AtomicUsize,
}

impl InMemoryBoundaryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature
    pub fn insert(&mut self, feature: BoundaryFeature) {
        self.features.push(feature);
    }

    /// Builder-style [`InMemoryBoundaryStore::insert`]
    pub fn with_feature(mut self, feature: BoundaryFeature) -> Self {
        self.insert(feature);
        self
    }

    /// Load every feature of a GeoJSON FeatureCollection
    ///
    /// Each feature must carry a `dataset` property naming one of the known dataset
    /// identifiers. Features with an unknown dataset or unreadable geometry are
    /// skipped with a warning. Returns the number of features added.
    pub fn load_geojson(&mut self, collection: &Value) -> Result<usize> {
        let features = collection
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                FacadeError::InvalidGeometry("expected a GeoJSON FeatureCollection".to_string())
            })?;

        let mut added = 0;
        for feature in features {
            let properties: HashMap<String, String> = feature
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(k, v)| {
                            let value = match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (k.clone(), value)
                        })
                        .collect()
                })
                .unwrap_or_default();

            let Some(dataset) = properties
                .get("dataset")
                .and_then(|id| Dataset::from_id(id))
            else {
                tracing::warn!(
                    "Skipping boundary feature with unknown dataset: {:?}",
                    properties.get("dataset")
                );
                continue;
            };

            let geometry = match geometry_from_geojson(feature) {
                Ok(geometry) => geometry,
                Err(err) => {
                    tracing::warn!(
                        "Skipping boundary feature {:?} in {}: {}",
                        properties.get(dataset.name_attribute()),
                        dataset,
                        err
                    );
                    continue;
                }
            };
            self.insert(BoundaryFeature {
                dataset,
                properties,
                geometry,
            });
            added += 1;
        }

        tracing::debug!("Loaded {} boundary features", added);
        Ok(added)
    }

    /// Load a GeoJSON FeatureCollection file
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let value: Value = serde_json::from_reader(reader)?;
        self.load_geojson(&value)
    }

    /// Number of features loaded
    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if the store holds no features
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Total number of `count` + `first_geometry` calls served so far
    #[inline]
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BoundaryStore for InMemoryBoundaryStore {
    async fn count(&self, query: &DatasetQuery) -> std::result::Result<usize, RemoteError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(self.features.iter().filter(|f| f.matches(query)).count())
    }

    async fn first_geometry(
        &self,
        query: &DatasetQuery,
    ) -> std::result::Result<Option<Geometry<f64>>, RemoteError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .features
            .iter()
            .find(|f| f.matches(query))
            .map(|f| f.geometry.clone()))
    }
}
