use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Deserialize;
use tracing::warn;

use foundation::{Bbox, LatLon};
use streaming::{DatasetSettings, ProviderKind};

use super::{Candidate, QueryProvider};
use crate::error::CompareError;

const ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";
const QUERY_HEAD: &str = "SELECT * WHERE {\n";

/// Wikidata SPARQL: one `wikibase:box` group per tile, joined with UNION.
/// `tagmatch` keys are Wikidata property ids fetched as optional columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct Wikidata;

#[derive(Debug, Deserialize)]
struct Response {
    results: Results,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    bindings: Vec<BTreeMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    value: String,
}

fn is_property_id(key: &str) -> bool {
    key.len() > 1 && key.starts_with('P') && key[1..].bytes().all(|b| b.is_ascii_digit())
}

/// `Point(lon lat)` WKT literal.
fn parse_wkt_point(s: &str) -> Option<LatLon> {
    let inner = s.trim().strip_prefix("Point(")?.strip_suffix(')')?;
    let mut parts = inner.split_whitespace();
    let lon = parts.next()?.parse().ok()?;
    let lat = parts.next()?.parse().ok()?;
    Some(LatLon::new(lat, lon))
}

impl QueryProvider for Wikidata {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Wikidata
    }

    fn init_query(&self) -> String {
        QUERY_HEAD.to_string()
    }

    fn add_item(&self, query: &mut String, settings: &DatasetSettings, bbox: Bbox, tile_name: &str) {
        if query.len() > QUERY_HEAD.len() {
            query.push_str("UNION\n");
        }
        let _ = writeln!(query, "{{ # {}/{}", settings.identifier, tile_name);
        let _ = writeln!(
            query,
            "SERVICE wikibase:box {{ ?item wdt:P625 ?location . \
             bd:serviceParam wikibase:cornerSouthWest \"Point({:.6} {:.6})\"^^geo:wktLiteral . \
             bd:serviceParam wikibase:cornerNorthEast \"Point({:.6} {:.6})\"^^geo:wktLiteral . }}",
            bbox.west, bbox.south, bbox.east, bbox.north
        );
        if !settings.query.trim().is_empty() {
            let _ = writeln!(query, "?item {} .", settings.query.trim());
        }
        for key in settings.tagmatch.keys() {
            if !is_property_id(key) {
                warn!(dataset = %settings.identifier, key = %key, "tagmatch key is not a property id");
                continue;
            }
            let _ = writeln!(query, "OPTIONAL {{ ?item wdt:{key} ?{key} . }}");
        }
        query.push_str("}\n");
    }

    fn finish_query(&self, mut query: String) -> String {
        query.push('}');
        query
    }

    fn parse_results(&self, body: &str) -> Result<Vec<Candidate>, CompareError> {
        let response: Response = serde_json::from_str(body)?;
        Ok(response
            .results
            .bindings
            .into_iter()
            .filter_map(|mut row| {
                let item = row.remove("item")?.value;
                let coordinates = parse_wkt_point(&row.remove("location")?.value)?;
                Some(Candidate {
                    id: self.normalize_value(&item).to_string(),
                    coordinates,
                    tags: row.into_iter().map(|(k, b)| (k, b.value)).collect(),
                })
            })
            .collect())
    }

    fn normalize_value<'a>(&self, value: &'a str) -> &'a str {
        value.strip_prefix(ENTITY_PREFIX).unwrap_or(value)
    }
}
