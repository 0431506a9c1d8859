use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decode::DecodeError;

/// External query dialect a dataset is compared against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Tag-based geospatial query (Overpass QL).
    #[default]
    Osm,
    /// Knowledge-base query (Wikidata SPARQL).
    Wikidata,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Osm => "osm",
            ProviderKind::Wikidata => "wikidata",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map layer a dataset's markers are drawn on. Visible means the dataset is
/// active and takes part in loading and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayLayer {
    pub visible: bool,
}

/// Per-dataset settings, read from `{url}dataset.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSettings {
    #[serde(skip)]
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL of the dataset; tile paths are resolved against it.
    #[serde(default)]
    pub url: String,
    /// Zoom level the dataset is tiled at.
    pub zoom: u8,
    /// Neighbourhood radius (meters) used to pad tile bboxes and to match
    /// external elements to points.
    #[serde(default)]
    pub dist: f64,
    #[serde(default)]
    pub query_type: ProviderKind,
    /// Property holding the point's own identifier.
    #[serde(default, rename = "id")]
    pub id_field: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Provider-specific selector inserted into each query item.
    #[serde(default)]
    pub query: String,
    /// External key → point property compared when scoring.
    #[serde(default)]
    pub tagmatch: BTreeMap<String, String>,
    #[serde(skip)]
    pub layer: DisplayLayer,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DatasetSettings {
    /// Parse a manifest body and attach the identifier, base URL and a fresh
    /// hidden display layer.
    pub fn from_manifest(
        identifier: impl Into<String>,
        base_url: impl Into<String>,
        body: &str,
    ) -> Result<Self, DecodeError> {
        if body.trim().is_empty() {
            return Err(DecodeError::Empty);
        }
        let mut settings: DatasetSettings = serde_json::from_str(body)?;
        settings.identifier = identifier.into();
        settings.url = base_url.into();
        settings.layer = DisplayLayer::default();
        Ok(settings)
    }

    /// Resolve `path` against the dataset base URL.
    pub fn resource_url(&self, path: &str) -> String {
        join_url(&self.url, path)
    }

    pub fn manifest_url(base_url: &str) -> String {
        join_url(base_url, "dataset.json")
    }
}

fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() || base.ends_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Datasets known to the session, in registration order.
///
/// Registration order is the order batch construction scans datasets in.
#[derive(Debug, Default, Clone)]
pub struct DatasetRegistry {
    datasets: Vec<DatasetSettings>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset. Re-registering an identifier replaces the settings
    /// in place and keeps the current layer visibility.
    pub fn insert(&mut self, mut settings: DatasetSettings) {
        match self
            .datasets
            .iter_mut()
            .find(|d| d.identifier == settings.identifier)
        {
            Some(existing) => {
                settings.layer = existing.layer;
                *existing = settings;
            }
            None => self.datasets.push(settings),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&DatasetSettings> {
        self.datasets.iter().find(|d| d.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// Returns `true` if the visibility changed.
    pub fn set_visible(&mut self, identifier: &str, visible: bool) -> bool {
        let Some(d) = self
            .datasets
            .iter_mut()
            .find(|d| d.identifier == identifier)
        else {
            return false;
        };
        let changed = d.layer.visible != visible;
        d.layer.visible = visible;
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetSettings> {
        self.datasets.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &DatasetSettings> {
        self.datasets.iter().filter(|d| d.layer.visible)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub url: String,
}

/// Datasets offered to the user, grouped by country code.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetCatalog {
    pub countries: BTreeMap<String, BTreeMap<String, CatalogEntry>>,
}

impl DatasetCatalog {
    pub fn from_json(body: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(body)?)
    }

    /// `(dataset id, base url)` pairs in stable country/dataset order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.countries
            .values()
            .flat_map(|d| d.iter().map(|(id, e)| (id.as_str(), e.url.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r#"{
        "name": "Post boxes",
        "zoom": 14,
        "dist": 50,
        "queryType": "osm",
        "id": "ref",
        "icon": "post",
        "query": "[\"amenity\"=\"post_box\"]",
        "tagmatch": {"ref": "ref", "operator": "operator"},
        "author": "someone"
    }"#;

    #[test]
    fn manifest_attaches_identity_and_hidden_layer() {
        let s = DatasetSettings::from_manifest("BEPostboxes", "https://example.org/be/post/", MANIFEST)
            .expect("manifest");
        assert_eq!(s.identifier, "BEPostboxes");
        assert_eq!(s.url, "https://example.org/be/post/");
        assert_eq!(s.zoom, 14);
        assert_eq!(s.query_type, ProviderKind::Osm);
        assert_eq!(s.id_field.as_deref(), Some("ref"));
        assert_eq!(s.tagmatch.len(), 2);
        assert!(!s.layer.visible);
        assert_eq!(s.extra.get("author"), Some(&serde_json::json!("someone")));
    }

    #[test]
    fn query_type_defaults_to_osm() {
        let s = DatasetSettings::from_manifest("x", "u/", r#"{"zoom": 12}"#).unwrap();
        assert_eq!(s.query_type, ProviderKind::Osm);
        assert_eq!(s.dist, 0.0);
    }

    #[test]
    fn empty_or_malformed_manifest_is_rejected() {
        assert!(matches!(
            DatasetSettings::from_manifest("x", "u/", "  "),
            Err(DecodeError::Empty)
        ));
        assert!(DatasetSettings::from_manifest("x", "u/", "{zoom:").is_err());
    }

    #[test]
    fn resource_urls_join_with_single_slash() {
        let mut s = DatasetSettings::from_manifest("x", "https://h/ds/", r#"{"zoom": 1}"#).unwrap();
        assert_eq!(s.resource_url("data/1_2.json"), "https://h/ds/data/1_2.json");
        s.url = "https://h/ds".to_string();
        assert_eq!(s.resource_url("data/1_2.json"), "https://h/ds/data/1_2.json");
        assert_eq!(DatasetSettings::manifest_url("https://h/ds/"), "https://h/ds/dataset.json");
    }

    #[test]
    fn registry_keeps_order_and_visibility_on_replace() {
        let mut reg = DatasetRegistry::new();
        reg.insert(DatasetSettings::from_manifest("b", "u/", r#"{"zoom": 1}"#).unwrap());
        reg.insert(DatasetSettings::from_manifest("a", "u/", r#"{"zoom": 1}"#).unwrap());
        assert!(reg.set_visible("b", true));
        assert!(!reg.set_visible("b", true));
        assert!(!reg.set_visible("missing", true));

        reg.insert(DatasetSettings::from_manifest("b", "v/", r#"{"zoom": 2}"#).unwrap());
        let ids: Vec<_> = reg.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        let b = reg.get("b").unwrap();
        assert_eq!(b.zoom, 2);
        assert!(b.layer.visible);
        assert_eq!(reg.active().count(), 1);
    }

    #[test]
    fn catalog_lists_entries_by_country() {
        let c = DatasetCatalog::from_json(
            r#"{"NL": {"NLFuel": {"url": "nl/fuel/"}}, "BE": {"BEPost": {"url": "be/post/"}}}"#,
        )
        .unwrap();
        let entries: Vec<_> = c.entries().collect();
        assert_eq!(entries, vec![("BEPost", "be/post/"), ("NLFuel", "nl/fuel/")]);
    }
}
