//! Utility functions for cache keys, name casing and spherical geometry

use geo::{Coord, LineString, Point, Polygon};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Number of vertices used to approximate a buffered point
pub const BUFFER_SEGMENTS: usize = 64;

/// Trim and collapse every run of internal whitespace to a single space
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a place name into a cache key
///
/// Lower-cased, trimmed, internal whitespace collapsed to single underscores.
/// `"  San   Francisco "` and `"san francisco"` both map to `"san_francisco"`.
pub fn normalize_place_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Title-case a name: first letter of every word upper-cased, the rest lower-cased
///
/// Words are delimited by whitespace and hyphens, which are preserved.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for c in name.chars() {
        if c.is_whitespace() || c == '-' {
            out.push(c);
            at_word_start = true;
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Deterministic content hash of structured parameters
///
/// The value is first encoded as JSON through `serde_json::Value`, whose object
/// maps keep their keys sorted, so logically equal inputs hash identically
/// regardless of field insertion order.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let canonical = serde_json::to_value(value)
        .map(|v| v.to_string())
        .unwrap_or_default();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Great-circle distance between two WGS84 coordinates (x = lon, y = lat) in meters
#[inline(always)]
pub fn haversine_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lat = (b.y - a.y).to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Coordinate reached by travelling `distance_m` from `origin` along `bearing_deg`
pub fn destination(origin: Coord<f64>, bearing_deg: f64, distance_m: f64) -> Coord<f64> {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.y.to_radians();
    let lon1 = origin.x.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    // Normalize longitude to [-180, 180)
    let lon2 = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
    Coord {
        x: lon2,
        y: lat2.to_degrees(),
    }
}

/// Approximate a circle of `radius_m` around `center` as a closed polygon
pub fn buffer_point(center: Point<f64>, radius_m: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..BUFFER_SEGMENTS)
        .map(|i| {
            let bearing = 360.0 * i as f64 / BUFFER_SEGMENTS as f64;
            destination(center.0, bearing, radius_m)
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::from(ring), vec![])
}

/// Length of a line string in meters, summing haversine distances
pub fn line_length_m(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|segment| haversine_distance(segment.start, segment.end))
        .sum()
}

/// Check if a coordinate is a valid WGS84 longitude/latitude pair
#[inline(always)]
pub fn is_valid_wgs84(lon: f64, lat: f64) -> bool {
    lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat)
}
