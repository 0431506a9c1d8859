use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Deserialize;

use foundation::{Bbox, LatLon};
use streaming::{DatasetSettings, ProviderKind};

use super::{Candidate, QueryProvider};
use crate::error::CompareError;

/// Overpass QL: one `nwr` statement per tile inside a union, elements
/// returned with their tags and a center point.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overpass;

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<Center>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Center {
    lat: f64,
    lon: f64,
}

impl QueryProvider for Overpass {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Osm
    }

    fn init_query(&self) -> String {
        "[out:json][timeout:25];\n(\n".to_string()
    }

    fn add_item(&self, query: &mut String, settings: &DatasetSettings, bbox: Bbox, tile_name: &str) {
        // Overpass bbox order is (south, west, north, east).
        let _ = writeln!(
            query,
            "nwr{}({:.6},{:.6},{:.6},{:.6}); /* {}/{} */",
            settings.query,
            bbox.south,
            bbox.west,
            bbox.north,
            bbox.east,
            settings.identifier,
            tile_name
        );
    }

    fn finish_query(&self, mut query: String) -> String {
        query.push_str(");\nout center;");
        query
    }

    fn parse_results(&self, body: &str) -> Result<Vec<Candidate>, CompareError> {
        let response: Response = serde_json::from_str(body)?;
        Ok(response
            .elements
            .into_iter()
            .filter_map(|e| {
                let coordinates = match (e.lat, e.lon, e.center) {
                    (Some(lat), Some(lon), _) => LatLon::new(lat, lon),
                    (_, _, Some(c)) => LatLon::new(c.lat, c.lon),
                    _ => return None,
                };
                Some(Candidate {
                    id: format!("{}/{}", e.kind, e.id),
                    coordinates,
                    tags: e.tags,
                })
            })
            .collect())
    }
}
