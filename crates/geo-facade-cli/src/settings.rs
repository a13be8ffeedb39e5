use clap::{Parser, Subcommand};
use geo_facade_lib::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Generic function to get environment variable, parsing it to the desired type.
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Geo Facade - Resolve human-friendly place references into exact boundaries
pub struct Settings {
    /// GeoJSON FeatureCollections with boundary features (each feature needs a `dataset` property)
    #[clap(short, long, value_name = "FILE")]
    pub boundaries: Vec<PathBuf>,

    /// Maximum number of boundary probes in flight at once
    #[clap(long, default_value = "3")]
    pub max_concurrent_requests: usize,

    /// Budget for a single boundary probe, in seconds
    #[clap(long, default_value = "10")]
    pub probe_timeout: u64,

    /// Radius in meters used to turn a coordinate pair into an area
    #[clap(long, default_value = "10000")]
    pub point_buffer_meters: f64,

    /// Number of locations resolved in parallel per batch chunk
    #[clap(long, default_value = "5")]
    pub batch_chunk_size: usize,

    /// Pretty-print JSON output
    #[clap(long, default_value = "false")]
    pub pretty: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve locations and print them as a GeoJSON FeatureCollection
    Resolve {
        /// Place names ("Austin, Texas"), coordinates ("-122.4, 37.7") or GeoJSON
        #[clap(required = true, allow_hyphen_values = true)]
        locations: Vec<String>,
    },
    /// Resolve locations, then print cache, probe and queue statistics
    Stats {
        /// Locations to resolve before reporting (each one twice, to show cache hits)
        #[clap(allow_hyphen_values = true)]
        locations: Vec<String>,
    },
    /// Run a local measurement over a resolved region
    Compute {
        /// Region to measure
        #[clap(allow_hyphen_values = true)]
        region: String,

        /// One of: area, perimeter, bbox, centroid, summary
        #[clap(short, long, default_value = "summary")]
        operation: String,
    },
}

impl Settings {
    /// Parse the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Library configuration from the command line plus environment overrides
    ///
    /// Cache sizing is only tunable through the environment:
    /// `GEO_FACADE_GEOMETRY_CACHE_CAPACITY`, `GEO_FACADE_RESULT_CACHE_CAPACITY` and
    /// `GEO_FACADE_CACHE_TTL_SECS`.
    pub fn to_config(&self) -> Config {
        let mut config = Config {
            max_concurrent_requests: self.max_concurrent_requests,
            probe_timeout: Duration::from_secs(self.probe_timeout),
            point_buffer_meters: self.point_buffer_meters,
            batch_chunk_size: self.batch_chunk_size,
            ..Config::default()
        };

        if let Some(capacity) = get_env("GEO_FACADE_GEOMETRY_CACHE_CAPACITY") {
            config.geometry_cache_capacity = capacity;
        }
        if let Some(capacity) = get_env("GEO_FACADE_RESULT_CACHE_CAPACITY") {
            config.result_cache_capacity = capacity;
        }
        if let Some(secs) = get_env::<u64>("GEO_FACADE_CACHE_TTL_SECS") {
            config.geometry_cache_ttl = Duration::from_secs(secs);
            config.result_cache_ttl = Duration::from_secs(secs);
        }
        config
    }
}
