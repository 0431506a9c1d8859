use std::collections::BTreeMap;

use serde_json::{Map, Value};

use foundation::{LatLon, TileIndex, lat_lon_to_tile_at};

use crate::dataset::DatasetSettings;
use crate::residency::TileStatus;

/// A dataset tile: `(dataset id, x, y)` at the dataset's tile zoom.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    pub dataset_id: String,
    pub tile: TileIndex,
}

impl TileKey {
    pub fn new(dataset_id: impl Into<String>, x: u32, y: u32) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            tile: TileIndex::new(x, y),
        }
    }

    pub fn name(&self) -> String {
        self.tile.name()
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}_{}", self.dataset_id, self.tile.x, self.tile.y)
    }
}

/// Outcome of comparing one point against the external source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub score: f64,
    pub max_score: f64,
    pub is_matched: bool,
}

impl Comparison {
    pub fn is_complete(&self) -> bool {
        self.score >= self.max_score - 0.01
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub coordinates: LatLon,
    pub properties: Map<String, Value>,
    /// Absent until a comparison result arrives.
    pub comparison: Option<Comparison>,
}

impl Point {
    pub fn new(coordinates: LatLon, properties: Map<String, Value>) -> Self {
        Self {
            coordinates,
            properties,
            comparison: None,
        }
    }

    /// Property rendered as plain text (strings unquoted, numbers/bools as
    /// their JSON text). `None` for missing or null properties.
    pub fn property_text(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileRecord {
    pub status: TileStatus,
    pub points: Vec<Point>,
    pub queried_externally: bool,
}

/// The 3×3 tiles around `center` at the dataset's tile zoom.
pub fn tiles_in_view(dataset: &DatasetSettings, center: LatLon) -> Vec<TileKey> {
    lat_lon_to_tile_at(center, dataset.zoom)
        .neighborhood(dataset.zoom)
        .into_iter()
        .map(|tile| TileKey {
            dataset_id: dataset.identifier.clone(),
            tile,
        })
        .collect()
}

/// Per-dataset, per-tile fetch and comparison state.
///
/// Keyed in a `BTreeMap` so scans are in stable `(dataset, x, y)` order.
/// Every transition is guarded: calling a mutator on a record that already
/// moved past that step is a no-op returning `false`.
#[derive(Debug, Default)]
pub struct TileStore {
    records: BTreeMap<TileKey, TileRecord>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn status(&self, key: &TileKey) -> TileStatus {
        self.records
            .get(key)
            .map(|r| r.status)
            .unwrap_or(TileStatus::Empty)
    }

    pub fn record(&self, key: &TileKey) -> Option<&TileRecord> {
        self.records.get(key)
    }

    pub fn points(&self, key: &TileKey) -> &[Point] {
        self.records
            .get(key)
            .map(|r| r.points.as_slice())
            .unwrap_or(&[])
    }

    pub fn points_mut(&mut self, key: &TileKey) -> Option<&mut Vec<Point>> {
        self.records.get_mut(key).map(|r| &mut r.points)
    }

    /// Create an Empty record for a tile the viewport references.
    pub fn touch(&mut self, key: &TileKey) {
        self.records.entry(key.clone()).or_default();
    }

    pub fn mark_loading(&mut self, key: &TileKey) -> bool {
        let record = self.records.entry(key.clone()).or_default();
        if record.status != TileStatus::Empty {
            return false;
        }
        record.status = TileStatus::Loading;
        true
    }

    pub fn record_loaded(&mut self, key: &TileKey, points: Vec<Point>) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        if record.status != TileStatus::Loading {
            return false;
        }
        record.status = TileStatus::Loaded;
        record.points = points;
        true
    }

    pub fn record_failed(&mut self, key: &TileKey) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        if record.status != TileStatus::Loading {
            return false;
        }
        record.status = TileStatus::Failed;
        true
    }

    /// Flag a tile as included in a comparison query. Only Loaded tiles can
    /// be flagged and the flag never reverts.
    pub fn mark_externally_queried(&mut self, key: &TileKey) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        if record.status != TileStatus::Loaded || record.queried_externally {
            return false;
        }
        record.queried_externally = true;
        true
    }

    /// Loaded tiles of `dataset_id` with at least one point that have not
    /// been part of any comparison query yet.
    pub fn eligible(&self, dataset_id: &str) -> Vec<TileKey> {
        self.records
            .iter()
            .filter(|(k, r)| {
                k.dataset_id == dataset_id
                    && r.status == TileStatus::Loaded
                    && !r.queried_externally
                    && !r.points.is_empty()
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &TileRecord)> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSettings;

    fn point(lat: f64, lon: f64) -> Point {
        Point::new(LatLon::new(lat, lon), Map::new())
    }

    #[test]
    fn lifecycle_guards_are_idempotent() {
        let mut store = TileStore::new();
        let k = TileKey::new("ds", 1, 2);

        assert!(store.mark_loading(&k));
        assert!(!store.mark_loading(&k));
        assert!(!store.mark_externally_queried(&k));

        assert!(store.record_loaded(&k, vec![point(1.0, 2.0)]));
        assert!(!store.record_loaded(&k, vec![]));
        assert!(!store.record_failed(&k));
        assert!(!store.mark_loading(&k));
        assert_eq!(store.points(&k).len(), 1);

        assert!(store.mark_externally_queried(&k));
        assert!(!store.mark_externally_queried(&k));
        assert!(store.record(&k).unwrap().queried_externally);
    }

    #[test]
    fn failed_tiles_are_terminal() {
        let mut store = TileStore::new();
        let k = TileKey::new("ds", 0, 0);
        assert!(!store.record_failed(&k));
        store.mark_loading(&k);
        assert!(store.record_failed(&k));
        assert_eq!(store.status(&k), TileStatus::Failed);
        assert!(!store.mark_loading(&k));
        assert!(store.eligible("ds").is_empty());
    }

    #[test]
    fn eligible_excludes_empty_and_queried_tiles() {
        let mut store = TileStore::new();
        let full = TileKey::new("ds", 0, 0);
        let empty = TileKey::new("ds", 0, 1);
        let queried = TileKey::new("ds", 0, 2);
        let other = TileKey::new("other", 0, 0);
        for k in [&full, &empty, &queried, &other] {
            store.mark_loading(k);
        }
        store.record_loaded(&full, vec![point(0.0, 0.0)]);
        store.record_loaded(&empty, vec![]);
        store.record_loaded(&queried, vec![point(0.0, 0.0)]);
        store.record_loaded(&other, vec![point(0.0, 0.0)]);
        store.mark_externally_queried(&queried);

        assert_eq!(store.eligible("ds"), vec![full]);
        assert_eq!(store.eligible("other"), vec![other]);
    }

    #[test]
    fn view_is_a_three_by_three_block_at_dataset_zoom() {
        let ds = DatasetSettings::from_manifest("ds", "u/", r#"{"zoom": 14}"#).unwrap();
        let keys = tiles_in_view(&ds, LatLon::new(50.8467, 4.3525));
        assert_eq!(keys.len(), 9);
        assert!(keys.contains(&TileKey::new("ds", 8390, 5496)));
        assert!(keys.contains(&TileKey::new("ds", 8389, 5495)));
        assert!(keys.contains(&TileKey::new("ds", 8391, 5497)));
    }

    #[test]
    fn property_text_unquotes_strings() {
        let mut props = Map::new();
        props.insert("a".into(), Value::from("x"));
        props.insert("b".into(), Value::from(3));
        props.insert("c".into(), Value::Null);
        let p = Point::new(LatLon::new(0.0, 0.0), props);
        assert_eq!(p.property_text("a").as_deref(), Some("x"));
        assert_eq!(p.property_text("b").as_deref(), Some("3"));
        assert_eq!(p.property_text("c"), None);
        assert_eq!(p.property_text("d"), None);
    }
}
