use serde::Serialize;

use session::{DisplaySettings, DriveReport, Session};
use streaming::{DatasetRegistry, TileStore};

/// One dataset point and how it compared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRow {
    pub dataset: String,
    pub tile: String,
    pub id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub matched: Option<bool>,
    pub grade: Option<u8>,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub fragment: String,
    pub manifests: usize,
    pub tiles_fetched: usize,
    pub tiles_failed: u64,
    pub queries: usize,
    pub events: usize,
    pub points: Vec<PointRow>,
}

impl RunSummary {
    pub fn new(session: &Session, report: DriveReport, fragment: String) -> Self {
        Self {
            fragment,
            manifests: report.manifests,
            tiles_fetched: report.tiles,
            tiles_failed: session.fetcher().failed(),
            queries: report.queries,
            events: report.events,
            points: point_rows(session.datasets(), session.store(), session.display()),
        }
    }

    pub fn print_text(&self) {
        for row in &self.points {
            let result = match (row.score, row.max_score, row.matched) {
                (Some(score), Some(max), Some(matched)) => {
                    format!("{score}/{max} {}", if matched { "matched" } else { "missing" })
                }
                _ => "not compared".to_string(),
            };
            let hidden = if row.visible { "" } else { " (hidden)" };
            println!(
                "{}/{} {} ({:.5}, {:.5}): {result}{hidden}",
                row.dataset,
                row.tile,
                row.id.as_deref().unwrap_or("-"),
                row.lat,
                row.lon,
            );
        }
        println!(
            "{} manifests, {} tiles ({} failed), {} queries",
            self.manifests, self.tiles_fetched, self.tiles_failed, self.queries
        );
        println!("{}", self.fragment);
    }
}

/// Points of the active datasets, in tile key order.
pub fn point_rows(
    datasets: &DatasetRegistry,
    store: &TileStore,
    display: &DisplaySettings,
) -> Vec<PointRow> {
    let mut rows = Vec::new();
    for (key, record) in store.iter() {
        let Some(settings) = datasets.get(&key.dataset_id) else {
            continue;
        };
        if !settings.layer.visible {
            continue;
        }
        for point in &record.points {
            let marker = display.marker(point);
            rows.push(PointRow {
                dataset: key.dataset_id.clone(),
                tile: key.name(),
                id: settings
                    .id_field
                    .as_deref()
                    .and_then(|field| point.property_text(field)),
                lat: point.coordinates.lat,
                lon: point.coordinates.lon,
                score: point.comparison.map(|c| c.score),
                max_score: point.comparison.map(|c| c.max_score),
                matched: point.comparison.map(|c| c.is_matched),
                grade: marker.grade,
                visible: marker.visible,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};
    use streaming::{Comparison, DatasetSettings, Point, TileKey};

    #[test]
    fn rows_cover_active_datasets_only() {
        let mut datasets = DatasetRegistry::new();
        for id in ["on", "off"] {
            datasets.insert(
                DatasetSettings::from_manifest(id, "u/", r#"{"zoom": 14, "id": "ref"}"#).unwrap(),
            );
        }
        datasets.set_visible("on", true);

        let mut props = Map::new();
        props.insert("ref".into(), Value::from(12));
        let mut scored = Point::new(foundation::LatLon::new(50.0, 4.0), props);
        scored.comparison = Some(Comparison {
            score: 1.0,
            max_score: 2.0,
            is_matched: true,
        });

        let mut store = TileStore::new();
        for id in ["on", "off"] {
            let key = TileKey::new(id, 3, 4);
            store.mark_loading(&key);
            store.record_loaded(&key, vec![scored.clone()]);
        }

        let mut display = DisplaySettings::new();
        display.set(session::HIDE_MATCHED, true);
        let rows = point_rows(&datasets, &store, &display);
        assert_eq!(
            rows,
            vec![PointRow {
                dataset: "on".into(),
                tile: "3_4".into(),
                id: Some("12".into()),
                lat: 50.0,
                lon: 4.0,
                score: Some(1.0),
                max_score: Some(2.0),
                matched: Some(true),
                grade: Some(5),
                visible: false,
            }]
        );
    }
}
