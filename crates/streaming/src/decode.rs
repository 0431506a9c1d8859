//! GeoJSON tile decoding.
//!
//! Tiles are FeatureCollections. Only point geometries carry meaning; other
//! geometry types are tolerated and skipped.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use foundation::LatLon;

use crate::store::Point;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty body")]
    Empty,
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Decode a FeatureCollection body into points, in feature order.
///
/// GeoJSON positions are `[lon, lat]`; points come out latitude first.
pub fn decode_point_features(body: &str) -> Result<Vec<Point>, DecodeError> {
    if body.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    let collection: FeatureCollection = serde_json::from_str(body)?;

    let mut points = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;
    for feature in collection.features {
        let Some(coordinates) = feature.geometry.as_ref().and_then(point_position) else {
            skipped += 1;
            continue;
        };
        points.push(Point::new(coordinates, feature.properties.unwrap_or_default()));
    }
    if skipped > 0 {
        debug!(skipped, "skipped non-point features");
    }
    Ok(points)
}

fn point_position(geometry: &Geometry) -> Option<LatLon> {
    if geometry.kind != "Point" {
        return None;
    }
    let pos = geometry.coordinates.as_array()?;
    let lon = pos.first()?.as_f64()?;
    let lat = pos.get(1)?.as_f64()?;
    Some(LatLon::new(lat, lon))
}
