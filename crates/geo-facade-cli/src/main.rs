mod logging;
mod measure;
mod settings;

use geo_facade_lib::{
    BatchOutcome, ComputeRequest, GeoFacade, InMemoryBoundaryStore, ResolvedBoundary, Result,
    geometry_to_geojson,
};
use measure::LocalMeasurements;
use serde_json::{Value, json};
use settings::{Command, Settings};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::from_cli();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("Failed to start the async runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    let mut store = InMemoryBoundaryStore::new();
    for path in &settings.boundaries {
        let added = store.load_file(path)?;
        tracing::info!("Loaded {} boundary features from {}", added, path.display());
    }
    if store.is_empty() {
        tracing::warn!("No boundary features loaded; only coordinates and inline GeoJSON will resolve");
    }

    let facade = GeoFacade::new(
        settings.to_config(),
        Arc::new(store),
        Arc::new(LocalMeasurements),
    );

    let output = match &settings.command {
        Command::Resolve { locations } => resolve(&facade, locations).await?,
        Command::Stats { locations } => {
            // The second pass is served from the caches
            for _ in 0..2 {
                facade.resolve_batch(locations.iter().cloned()).await?;
            }
            serde_json::to_value(facade.cache_stats())?
        }
        Command::Compute { region, operation } => facade
            .compute(ComputeRequest::new(region.as_str(), operation.as_str()))
            .await?
            .to_json(),
    };

    let text = if settings.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        output.to_string()
    };
    println!("{text}");
    Ok(())
}

/// Resolve every location and report them as one FeatureCollection
///
/// Locations that could not be resolved are listed under `errors` instead of
/// failing the whole command.
async fn resolve(facade: &GeoFacade, locations: &[String]) -> Result<Value> {
    let results = facade.resolve_batch(locations.iter().cloned()).await?;
    feature_collection(locations, &results)
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn feature_collection(
    locations: &[String],
    results: &HashMap<String, BatchOutcome<ResolvedBoundary>>,
) -> Result<Value> {
    let mut features = Vec::new();
    let mut errors = Vec::new();

    for location in locations {
        match results.get(location) {
            Some(Ok(boundary)) => features.push(json!({
                "type": "Feature",
                "id": location,
                "geometry": geometry_to_geojson(&boundary.geometry)?,
                "properties": serde_json::to_value(&boundary.provenance)?,
            })),
            Some(Err(err)) => errors.push(json!({ "input": location, "message": err.message })),
            None => errors.push(json!({ "input": location, "message": "not processed" })),
        }
    }

    Ok(json!({
        "type": "FeatureCollection",
        "features": features,
        "errors": errors,
    }))
}
