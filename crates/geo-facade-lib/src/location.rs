//! Location references and inline GeoJSON geometry parsing
//!
//! A [`LocationReference`] is the parsed, immutable form of whatever the caller
//! handed in: a coordinate pair, an inline geometry, a bare place name, or a place
//! name with an explicit context ("Austin, Texas").

use crate::{FacadeError, Result, utils};
use geo::{Coord, Geometry, GeometryCollection, LineString, MultiPolygon, Point, Polygon};
use serde_json::{Value, json};

/// Parsed location reference
#[derive(Debug, Clone, PartialEq)]
pub enum LocationReference {
    /// A raw longitude/latitude pair
    Coordinates { lon: f64, lat: f64 },
    /// Inline geometry (GeoJSON Point, Polygon, MultiPolygon, Feature or FeatureCollection)
    Geometry(Geometry<f64>),
    /// A free-form place name, whitespace-collapsed
    PlaceName(String),
    /// A place name qualified by a broader region, e.g. city + country
    PlaceWithContext { primary: String, context: String },
}

impl LocationReference {
    /// Parse a free-form location string
    ///
    /// Coordinate pairs are read as `lon, lat` (optionally bracketed). Strings that
    /// look like JSON objects are tried as GeoJSON. Everything else is a place name,
    /// split on the first comma into primary name and context.
    pub fn parse(input: &str) -> Self {
        let collapsed = utils::collapse_whitespace(input);

        if let Some((lon, lat)) = parse_coordinate_pair(&collapsed) {
            return LocationReference::Coordinates { lon, lat };
        }

        if collapsed.starts_with('{') {
            if let Ok(geometry) = serde_json::from_str::<Value>(&collapsed)
                .map_err(FacadeError::from)
                .and_then(|value| geometry_from_geojson(&value))
            {
                return LocationReference::Geometry(geometry);
            }
        }

        if let Some((primary, context)) = collapsed.split_once(',') {
            let primary = primary.trim();
            let context = context.trim();
            if !primary.is_empty() && !context.is_empty() {
                return LocationReference::PlaceWithContext {
                    primary: primary.to_string(),
                    context: context.to_string(),
                };
            }
        }

        LocationReference::PlaceName(collapsed.trim_matches(',').trim().to_string())
    }

    /// Build a reference from structured JSON: a GeoJSON object, a `[lon, lat]`
    /// array, or a string that is parsed with [`LocationReference::parse`]
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::parse(s)),
            Value::Array(_) => {
                let coord = coord_from_json(value)?;
                if !utils::is_valid_wgs84(coord.x, coord.y) {
                    return Err(FacadeError::InvalidGeometry(format!(
                        "coordinates out of range: [{}, {}]",
                        coord.x, coord.y
                    )));
                }
                Ok(LocationReference::Coordinates {
                    lon: coord.x,
                    lat: coord.y,
                })
            }
            Value::Object(_) => Ok(LocationReference::Geometry(geometry_from_geojson(value)?)),
            other => Err(FacadeError::InvalidGeometry(format!(
                "unsupported location reference: {other}"
            ))),
        }
    }

    /// Canonical display form, shared by every spelling of the same reference
    ///
    /// `"Paris,France"` and `" Paris ,  France"` both become `"Paris, France"`.
    /// Inline geometries have no name and all display as `"inline geometry"`.
    pub fn canonical_name(&self) -> String {
        match self {
            LocationReference::Coordinates { lon, lat } => format!("{lon}, {lat}"),
            LocationReference::Geometry(_) => "inline geometry".to_string(),
            LocationReference::PlaceName(name) => name.clone(),
            LocationReference::PlaceWithContext { primary, context } => {
                format!("{primary}, {context}")
            }
        }
    }

    /// Whether this reference resolves without consulting any boundary dataset
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            LocationReference::Coordinates { .. } | LocationReference::Geometry(_)
        )
    }
}

/// Parse `"lon, lat"`, `"[lon, lat]"` or `"(lon, lat)"`
fn parse_coordinate_pair(input: &str) -> Option<(f64, f64)> {
    let inner = input
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let (lon, lat) = inner.split_once(',')?;
    let lon: f64 = lon.trim().parse().ok()?;
    let lat: f64 = lat.trim().parse().ok()?;
    utils::is_valid_wgs84(lon, lat).then_some((lon, lat))
}

fn coord_from_json(value: &Value) -> Result<Coord<f64>> {
    let invalid = || FacadeError::InvalidGeometry(format!("invalid position: {value}"));
    let position = value.as_array().ok_or_else(invalid)?;
    match (
        position.first().and_then(Value::as_f64),
        position.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(invalid()),
    }
}

fn ring_from_json(value: &Value) -> Result<LineString<f64>> {
    let positions = value
        .as_array()
        .ok_or_else(|| FacadeError::InvalidGeometry("ring is not an array".to_string()))?;
    let coords = positions
        .iter()
        .map(coord_from_json)
        .collect::<Result<Vec<_>>>()?;
    if coords.len() < 4 {
        return Err(FacadeError::InvalidGeometry(format!(
            "ring needs at least 4 positions, got {}",
            coords.len()
        )));
    }
    Ok(LineString::from(coords))
}

fn polygon_from_json(value: &Value) -> Result<Polygon<f64>> {
    let rings = value
        .as_array()
        .ok_or_else(|| FacadeError::InvalidGeometry("polygon is not an array".to_string()))?;
    let mut rings = rings.iter().map(ring_from_json);
    let exterior = rings
        .next()
        .ok_or_else(|| FacadeError::InvalidGeometry("polygon has no rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Convert a GeoJSON object into a `geo` geometry
///
/// Supports Point, Polygon, MultiPolygon, Feature and FeatureCollection. A
/// FeatureCollection becomes a `GeometryCollection` of its feature geometries.
pub fn geometry_from_geojson(value: &Value) -> Result<Geometry<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FacadeError::InvalidGeometry("missing GeoJSON 'type'".to_string()))?;
    let coordinates = || {
        value.get("coordinates").ok_or_else(|| {
            FacadeError::InvalidGeometry(format!("{kind} without 'coordinates'"))
        })
    };

    match kind {
        "Point" => {
            let coord = coord_from_json(coordinates()?)?;
            Ok(Geometry::Point(Point(coord)))
        }
        "Polygon" => Ok(Geometry::Polygon(polygon_from_json(coordinates()?)?)),
        "MultiPolygon" => {
            let polygons = coordinates()?
                .as_array()
                .ok_or_else(|| {
                    FacadeError::InvalidGeometry("MultiPolygon is not an array".to_string())
                })?
                .iter()
                .map(polygon_from_json)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        "Feature" => {
            let geometry = value.get("geometry").ok_or_else(|| {
                FacadeError::InvalidGeometry("Feature without 'geometry'".to_string())
            })?;
            geometry_from_geojson(geometry)
        }
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    FacadeError::InvalidGeometry("FeatureCollection without 'features'".to_string())
                })?;
            if features.is_empty() {
                return Err(FacadeError::InvalidGeometry(
                    "FeatureCollection is empty".to_string(),
                ));
            }
            let geometries = features
                .iter()
                .map(geometry_from_geojson)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::GeometryCollection(GeometryCollection(geometries)))
        }
        other => Err(FacadeError::InvalidGeometry(format!(
            "unsupported GeoJSON type '{other}'"
        ))),
    }
}

fn ring_to_json(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_to_json(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_to_json(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_to_json));
    Value::Array(rings)
}

/// Convert a `geo` geometry back into a GeoJSON geometry object
///
/// Geometry kinds without a GeoJSON counterpart in this crate (lines, rects,
/// triangles) are reported as `InvalidGeometry`.
pub fn geometry_to_geojson(geometry: &Geometry<f64>) -> Result<Value> {
    match geometry {
        Geometry::Point(p) => Ok(json!({ "type": "Point", "coordinates": [p.x(), p.y()] })),
        Geometry::Polygon(p) => Ok(json!({ "type": "Polygon", "coordinates": polygon_to_json(p) })),
        Geometry::MultiPolygon(mp) => Ok(json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_to_json).collect::<Vec<_>>(),
        })),
        Geometry::GeometryCollection(gc) => Ok(json!({
            "type": "GeometryCollection",
            "geometries": gc.0.iter().map(geometry_to_geojson).collect::<Result<Vec<_>>>()?,
        })),
        other => Err(FacadeError::InvalidGeometry(format!(
            "cannot encode {other:?} as GeoJSON"
        ))),
    }
}
