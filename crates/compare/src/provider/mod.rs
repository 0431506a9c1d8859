//! Query dialects of the external sources points are compared against.
//!
//! A provider builds one combined query out of many tile items and turns the
//! provider's response back into candidate elements. Scoring a point against
//! the candidates is shared, with a per-provider hook for normalizing values.

use std::collections::BTreeMap;

use foundation::{Bbox, LatLon, haversine_m};
use streaming::{Comparison, DatasetSettings, Point, ProviderKind};

use crate::error::CompareError;

mod overpass;
mod wikidata;

pub use overpass::Overpass;
pub use wikidata::Wikidata;

/// An element returned by the external source.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub coordinates: LatLon,
    pub tags: BTreeMap<String, String>,
}

pub trait QueryProvider: Sync {
    fn kind(&self) -> ProviderKind;

    fn init_query(&self) -> String;

    /// Append the item selecting `settings`' elements inside `bbox`.
    fn add_item(&self, query: &mut String, settings: &DatasetSettings, bbox: Bbox, tile_name: &str);

    fn finish_query(&self, query: String) -> String;

    fn parse_results(&self, body: &str) -> Result<Vec<Candidate>, CompareError>;

    /// Canonical form of an external value before it is compared with a
    /// point property.
    fn normalize_value<'a>(&self, value: &'a str) -> &'a str {
        value
    }

    fn compare(&self, settings: &DatasetSettings, point: &Point, candidates: &[Candidate]) -> Comparison {
        let max_score = 1.0 + settings.tagmatch.len() as f64;
        let best = candidates
            .iter()
            .filter(|c| haversine_m(point.coordinates, c.coordinates) <= settings.dist)
            .map(|c| 1 + matching_tags(self, settings, point, c))
            .max();

        match best {
            Some(score) => Comparison {
                score: score as f64,
                max_score,
                is_matched: true,
            },
            None => Comparison {
                score: 0.0,
                max_score,
                is_matched: false,
            },
        }
    }
}

fn matching_tags<P: QueryProvider + ?Sized>(
    provider: &P,
    settings: &DatasetSettings,
    point: &Point,
    candidate: &Candidate,
) -> usize {
    settings
        .tagmatch
        .iter()
        .filter(|(external, property)| {
            let Some(value) = candidate.tags.get(*external) else {
                return false;
            };
            point
                .property_text(property)
                .is_some_and(|expected| provider.normalize_value(value) == expected)
        })
        .count()
}

static OVERPASS: Overpass = Overpass;
static WIKIDATA: Wikidata = Wikidata;

pub fn provider_for(kind: ProviderKind) -> &'static dyn QueryProvider {
    match kind {
        ProviderKind::Osm => &OVERPASS,
        ProviderKind::Wikidata => &WIKIDATA,
    }
}
