//! Boundary datasets and the store abstraction the resolver queries
//!
//! The only primitive a boundary dataset offers is "filter by attribute equality,
//! then count or take the first feature's geometry". [`BoundaryStore`] models exactly
//! that, so a remote service client and the in-memory store used by the CLI and the
//! tests are interchangeable.

mod memory;

pub use memory::{BoundaryFeature, InMemoryBoundaryStore};

use crate::RemoteError;
use async_trait::async_trait;
use geo::Geometry;
use std::fmt;

/// Known boundary datasets, coarsest last
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dataset {
    /// US counties (high resolution, US only)
    UsCounties,
    /// US states (high resolution, US only)
    UsStates,
    /// International second-level administrative units (districts)
    GaulLevel2,
    /// International first-level administrative units (provinces, states)
    GaulLevel1,
    /// International country boundaries
    GaulLevel0,
    /// Simplified international country polygons
    LsibCountries,
}

impl Dataset {
    /// All datasets, in no particular priority
    pub const ALL: [Dataset; 6] = [
        Dataset::UsCounties,
        Dataset::UsStates,
        Dataset::GaulLevel2,
        Dataset::GaulLevel1,
        Dataset::GaulLevel0,
        Dataset::LsibCountries,
    ];

    /// Identifier of the dataset on the remote service
    pub fn id(&self) -> &'static str {
        match self {
            Dataset::UsCounties => "TIGER/2018/Counties",
            Dataset::UsStates => "TIGER/2018/States",
            Dataset::GaulLevel2 => "FAO/GAUL/2015/level2",
            Dataset::GaulLevel1 => "FAO/GAUL/2015/level1",
            Dataset::GaulLevel0 => "FAO/GAUL/2015/level0",
            Dataset::LsibCountries => "USDOS/LSIB_SIMPLE/2017",
        }
    }

    /// Look a dataset up by its remote identifier
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.id() == id)
    }

    /// Attribute holding the feature's own name
    pub fn name_attribute(&self) -> &'static str {
        match self {
            Dataset::UsCounties | Dataset::UsStates => "NAME",
            Dataset::GaulLevel2 => "ADM2_NAME",
            Dataset::GaulLevel1 => "ADM1_NAME",
            Dataset::GaulLevel0 => "ADM0_NAME",
            Dataset::LsibCountries => "country_na",
        }
    }

    /// Administrative level (0 = country, 1 = province/state, 2 = district/county)
    pub fn admin_level(&self) -> u8 {
        match self {
            Dataset::GaulLevel0 | Dataset::LsibCountries => 0,
            Dataset::UsStates | Dataset::GaulLevel1 => 1,
            Dataset::UsCounties | Dataset::GaulLevel2 => 2,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One probe target: which attribute of which dataset to compare a name against
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeTarget {
    pub dataset: Dataset,
    pub attribute: &'static str,
    pub level: u8,
}

impl ProbeTarget {
    /// Target the dataset's own name attribute
    pub const fn name_of(dataset: Dataset, attribute: &'static str, level: u8) -> Self {
        Self {
            dataset,
            attribute,
            level,
        }
    }

    /// Build an equality query for `value` against this target
    pub fn query(&self, value: &str) -> DatasetQuery {
        DatasetQuery::new(self.dataset).filter(self.attribute, value)
    }
}

/// Priority order of the exact-match sweep: country-specific high resolution
/// datasets first, then increasingly coarse international ones
pub const EXACT_MATCH_TARGETS: [ProbeTarget; 6] = [
    ProbeTarget::name_of(Dataset::UsCounties, "NAME", 2),
    ProbeTarget::name_of(Dataset::UsStates, "NAME", 1),
    ProbeTarget::name_of(Dataset::GaulLevel2, "ADM2_NAME", 2),
    ProbeTarget::name_of(Dataset::GaulLevel1, "ADM1_NAME", 1),
    ProbeTarget::name_of(Dataset::GaulLevel0, "ADM0_NAME", 0),
    ProbeTarget::name_of(Dataset::LsibCountries, "country_na", 0),
];

/// Attribute-equality query against one dataset
///
/// All filters must match (logical AND).
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct DatasetQuery {
    pub dataset: Dataset,
    pub filters: Vec<(String, String)>,
}

impl DatasetQuery {
    /// Create an unfiltered query
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            filters: Vec::new(),
        }
    }

    /// Add an `attribute == value` filter
    pub fn filter(mut self, attribute: &str, value: &str) -> Self {
        self.filters.push((attribute.to_string(), value.to_string()));
        self
    }

    /// Deterministic memoization key: `dataset?attr=value&attr=value`
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DatasetQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dataset.id())?;
        for (i, (attribute, value)) in self.filters.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{attribute}={value}")?;
        }
        Ok(())
    }
}

/// Read-only access to the boundary datasets
///
/// Implementations may fail or hang; callers wrap every call in their own timeout.
#[async_trait]
pub trait BoundaryStore: Send + Sync {
    /// Number of features matching the query
    async fn count(&self, query: &DatasetQuery) -> std::result::Result<usize, RemoteError>;

    /// Geometry of the first feature matching the query, if any
    async fn first_geometry(
        &self,
        query: &DatasetQuery,
    ) -> std::result::Result<Option<Geometry<f64>>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_ids_roundtrip() {
        for dataset in Dataset::ALL {
            assert_eq!(Dataset::from_id(dataset.id()), Some(dataset));
        }
        assert_eq!(Dataset::from_id("NOPE"), None);
    }

    #[test]
    fn test_targets_use_name_attributes() {
        for target in EXACT_MATCH_TARGETS {
            assert_eq!(target.attribute, target.dataset.name_attribute());
            assert_eq!(target.level, target.dataset.admin_level());
        }
        // Coarsest last
        let levels: Vec<u8> = EXACT_MATCH_TARGETS[2..].iter().map(|t| t.level).collect();
        assert_eq!(levels, vec![2, 1, 0, 0]);
    }

    #[test]
    fn test_query_cache_key() {
        let query = DatasetQuery::new(Dataset::GaulLevel2)
            .filter("ADM2_NAME", "Paris")
            .filter("ADM0_NAME", "France");
        assert_eq!(
            query.cache_key(),
            "FAO/GAUL/2015/level2?ADM2_NAME=Paris&ADM0_NAME=France"
        );
        assert_eq!(
            EXACT_MATCH_TARGETS[1].query("Texas").cache_key(),
            "TIGER/2018/States?NAME=Texas"
        );
    }
}
