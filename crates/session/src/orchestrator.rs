//! The session state machine.
//!
//! [`Session`] owns every piece of mutable state. User actions and network
//! completions go in as method calls; the network work they require comes out
//! as [`Effect`]s. Nothing here performs I/O.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use compare::{BatchId, CompareError, ProviderEndpoints, QueryBatcher, QueryDispatch, QueryStatus};
use streaming::{
    DatasetCatalog, DatasetRegistry, DatasetSettings, EventBus, FetchCoordinator, FetchError,
    SessionEvent, TileFetch, TileKey, TileStatus, TileStore, tiles_in_view,
};

use crate::codec::{SessionState, StateError, Viewport, decode};
use crate::display::DisplaySettings;

/// Work the driver performs on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchManifest {
        dataset_id: String,
        base_url: String,
        url: String,
    },
    FetchTile(TileFetch),
    DispatchQuery(QueryDispatch),
    PersistState(SessionState),
}

#[derive(Debug)]
pub struct Session {
    datasets: DatasetRegistry,
    store: TileStore,
    fetcher: FetchCoordinator,
    batcher: QueryBatcher,
    display: DisplaySettings,
    view: Option<Viewport>,
    /// Datasets the user switched on, including ones whose manifest has not
    /// arrived yet.
    requested: BTreeSet<String>,
    events: EventBus,
}

impl Session {
    pub fn new(endpoints: ProviderEndpoints) -> Self {
        Self {
            datasets: DatasetRegistry::new(),
            store: TileStore::new(),
            fetcher: FetchCoordinator::new(),
            batcher: QueryBatcher::new(endpoints),
            display: DisplaySettings::new(),
            view: None,
            requested: BTreeSet::new(),
            events: EventBus::new(),
        }
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn fetcher(&self) -> &FetchCoordinator {
        &self.fetcher
    }

    pub fn query_status(&self) -> QueryStatus {
        self.batcher.status()
    }

    pub fn queries_dispatched(&self) -> u64 {
        self.batcher.dispatched()
    }

    pub fn display(&self) -> &DisplaySettings {
        &self.display
    }

    pub fn view(&self) -> Option<Viewport> {
        self.view
    }

    pub fn events(&self) -> &[SessionEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }

    /// Request the manifest of every dataset listed in `catalog`.
    pub fn add_catalog(&mut self, catalog: &DatasetCatalog) -> Vec<Effect> {
        catalog
            .entries()
            .map(|(id, url)| self.add_dataset(id, url))
            .collect()
    }

    pub fn add_dataset(&mut self, dataset_id: &str, base_url: &str) -> Effect {
        debug!(dataset = dataset_id, base_url, "requesting dataset manifest");
        Effect::FetchManifest {
            dataset_id: dataset_id.to_string(),
            base_url: base_url.to_string(),
            url: DatasetSettings::manifest_url(base_url),
        }
    }

    /// Register a dataset from its manifest. If the user already asked for
    /// it, it becomes active and loading starts.
    pub fn manifest_loaded(
        &mut self,
        dataset_id: &str,
        base_url: &str,
        outcome: Result<String, FetchError>,
    ) -> Vec<Effect> {
        let settings = outcome.and_then(|body| {
            Ok(DatasetSettings::from_manifest(dataset_id, base_url, &body)?)
        });
        let settings = match settings {
            Ok(s) => s,
            Err(err) => {
                warn!(dataset = dataset_id, "dataset manifest unavailable: {err}");
                return Vec::new();
            }
        };
        info!(
            dataset = dataset_id,
            zoom = settings.zoom,
            provider = %settings.query_type,
            "dataset registered"
        );
        self.datasets.insert(settings);

        if self.requested.contains(dataset_id) && self.datasets.set_visible(dataset_id, true) {
            self.events.emit(SessionEvent::DatasetToggled {
                dataset_id: dataset_id.to_string(),
                visible: true,
            });
            return self.load_data();
        }
        Vec::new()
    }

    pub fn set_dataset_active(&mut self, dataset_id: &str, active: bool) -> Vec<Effect> {
        if active {
            self.requested.insert(dataset_id.to_string());
        } else {
            self.requested.remove(dataset_id);
        }
        if !self.datasets.contains(dataset_id) {
            // Applied when the manifest arrives.
            return Vec::new();
        }
        if self.datasets.set_visible(dataset_id, active) {
            self.events.emit(SessionEvent::DatasetToggled {
                dataset_id: dataset_id.to_string(),
                visible: active,
            });
        }
        self.load_data()
    }

    /// Move the map.
    pub fn set_view(&mut self, view: Viewport) -> Vec<Effect> {
        self.view = Some(view);
        self.load_data()
    }

    /// Plan fetches for the 3×3 tile neighbourhood of every active dataset,
    /// run a scheduling pass and persist the state.
    pub fn load_data(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(view) = self.view {
            for settings in self.datasets.active() {
                let keys = tiles_in_view(settings, view.center());
                for key in &keys {
                    self.store.touch(key);
                }
                effects.extend(
                    self.fetcher
                        .ensure_tiles_loaded(&mut self.store, settings, &keys)
                        .into_iter()
                        .map(Effect::FetchTile),
                );
            }
        }
        effects.extend(self.schedule());
        effects.push(Effect::PersistState(self.state()));
        effects
    }

    pub fn tile_fetched(&mut self, key: &TileKey, outcome: Result<String, FetchError>) -> Vec<Effect> {
        self.fetcher
            .complete(&mut self.store, key, outcome, &mut self.events);
        self.schedule().into_iter().collect()
    }

    pub fn query_finished(
        &mut self,
        batch: BatchId,
        outcome: Result<String, CompareError>,
    ) -> Vec<Effect> {
        self.batcher
            .complete(
                batch,
                outcome,
                &self.datasets,
                &mut self.store,
                &mut self.events,
            )
            .map(Effect::DispatchQuery)
            .into_iter()
            .collect()
    }

    /// Toggle a setting. Hide settings restyle every loaded point.
    pub fn change_setting(&mut self, setting_id: &str, enabled: bool) -> Vec<Effect> {
        if self.display.set(setting_id, enabled) {
            self.events.emit(SessionEvent::SettingChanged {
                setting_id: setting_id.to_string(),
                enabled,
            });
            if DisplaySettings::affects_points(setting_id) {
                self.restyle_points();
            }
        }
        vec![Effect::PersistState(self.state())]
    }

    fn restyle_points(&mut self) {
        let mut restyled = 0;
        for (key, record) in self.store.iter() {
            if record.status != TileStatus::Loaded {
                continue;
            }
            for index in 0..record.points.len() {
                self.events.emit(SessionEvent::PointRestyled {
                    key: key.clone(),
                    index,
                });
            }
            restyled += record.points.len();
        }
        debug!(points = restyled, "restyled loaded points");
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            viewport: self.view,
            datasets: self.requested.clone(),
            settings: self.display.enabled().clone(),
        }
    }

    /// Switch on everything `state` lists and move to its viewport. Nothing
    /// is switched off.
    pub fn apply_state(&mut self, state: &SessionState) -> Vec<Effect> {
        let mut effects = Vec::new();
        for id in &state.settings {
            effects.extend(self.change_setting(id, true));
        }
        for id in &state.datasets {
            effects.extend(self.set_dataset_active(id, true));
        }
        if let Some(view) = state.viewport {
            effects.extend(self.set_view(view));
        }
        // Only the final state needs persisting.
        let mut persisted = false;
        effects.reverse();
        effects.retain(|e| match e {
            Effect::PersistState(_) => !std::mem::replace(&mut persisted, true),
            _ => true,
        });
        effects.reverse();
        effects
    }

    /// Decode and apply a state string. Bad segments are logged and returned;
    /// the rest of the string still applies.
    pub fn apply_state_str(&mut self, input: &str) -> (Vec<Effect>, Vec<StateError>) {
        let (state, errors) = decode(input);
        for err in &errors {
            warn!("ignoring state segment: {err}");
        }
        (self.apply_state(&state), errors)
    }

    fn schedule(&mut self) -> Option<Effect> {
        self.batcher
            .schedule(&self.datasets, &mut self.store)
            .map(Effect::DispatchQuery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::display::{HIDE_COMPLETE, HIDE_MATCHED};

    const MANIFEST: &str =
        r#"{"zoom": 14, "dist": 30, "query": "[\"amenity\"=\"post_box\"]", "tagmatch": {"ref": "ref"}}"#;
    const TILE: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [4.3525, 50.8467]},
         "properties": {"ref": "1000"}}]}"#;

    fn fetches(effects: &[Effect]) -> Vec<&TileFetch> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::FetchTile(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    fn dispatches(effects: &[Effect]) -> Vec<&QueryDispatch> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::DispatchQuery(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    fn session_with_dataset() -> Session {
        let mut s = Session::new(ProviderEndpoints::default());
        s.set_dataset_active("post", true);
        s.manifest_loaded("post", "https://data/post/", Ok(MANIFEST.into()));
        s
    }

    #[test]
    fn catalog_entries_become_manifest_fetches() {
        let catalog =
            DatasetCatalog::from_json(r#"{"BE": {"post": {"url": "https://data/post/"}}}"#).unwrap();
        let mut s = Session::new(ProviderEndpoints::default());
        assert_eq!(
            s.add_catalog(&catalog),
            vec![Effect::FetchManifest {
                dataset_id: "post".into(),
                base_url: "https://data/post/".into(),
                url: "https://data/post/dataset.json".into(),
            }]
        );
    }

    #[test]
    fn dataset_requested_before_manifest_activates_on_arrival() {
        let mut s = Session::new(ProviderEndpoints::default());
        s.set_view(Viewport::new(15, 50.8467, 4.3525));
        assert!(s.set_dataset_active("post", true).is_empty());

        let effects = s.manifest_loaded("post", "https://data/post/", Ok(MANIFEST.into()));
        assert_eq!(fetches(&effects).len(), 9);
        assert!(fetches(&effects)[0].url.starts_with("https://data/post/data/"));
        assert!(matches!(effects.last(), Some(Effect::PersistState(_))));
        assert!(s.events().contains(&SessionEvent::DatasetToggled {
            dataset_id: "post".into(),
            visible: true
        }));
    }

    #[test]
    fn panning_within_the_neighbourhood_fetches_nothing_new() {
        let mut s = session_with_dataset();
        let first = s.set_view(Viewport::new(15, 50.8467, 4.3525));
        assert_eq!(fetches(&first).len(), 9);
        let again = s.set_view(Viewport::new(16, 50.8468, 4.3526));
        assert!(fetches(&again).is_empty());
        assert_eq!(s.fetcher().issued(), 9);
    }

    #[test]
    fn loaded_tile_triggers_a_comparison_query() {
        let mut s = session_with_dataset();
        let effects = s.set_view(Viewport::new(15, 50.8467, 4.3525));
        let key = fetches(&effects)[4].key.clone();

        let effects = s.tile_fetched(&key, Ok(TILE.into()));
        let d = dispatches(&effects);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].tiles, vec![key.clone()]);
        assert!(s.query_status().busy);

        let body = r#"{"elements": [{"type": "node", "id": 1, "lat": 50.8467, "lon": 4.3525, "tags": {"ref": "1000"}}]}"#;
        assert!(s.query_finished(d[0].batch, Ok(body.into())).is_empty());
        let c = s.store().points(&key)[0].comparison.unwrap();
        assert!(c.is_matched && c.is_complete());
        assert!(!s.query_status().busy);
    }

    #[test]
    fn failed_tile_still_runs_a_scheduling_pass() {
        let mut s = session_with_dataset();
        let effects = s.set_view(Viewport::new(15, 50.8467, 4.3525));
        let keys: Vec<TileKey> = fetches(&effects).iter().map(|f| f.key.clone()).collect();

        s.tile_fetched(&keys[0], Ok(TILE.into()));
        let effects = s.tile_fetched(&keys[1], Err(FetchError::Status(404)));
        assert!(dispatches(&effects).is_empty());
        assert!(s.query_status().waiting);
        assert_eq!(s.store().status(&keys[1]), TileStatus::Failed);
    }

    #[test]
    fn deactivating_stops_loading_for_that_dataset() {
        let mut s = session_with_dataset();
        s.set_dataset_active("post", false);
        let effects = s.set_view(Viewport::new(15, 50.8467, 4.3525));
        assert!(fetches(&effects).is_empty());
        assert!(s.state().datasets.is_empty());
    }

    #[test]
    fn state_round_trips_through_apply() {
        let mut s = session_with_dataset();
        s.change_setting("hideMatchedPOI", true);
        s.set_view(Viewport::new(15, 50.8467, 4.3525));
        let state = s.state();

        let mut restored = Session::new(ProviderEndpoints::default());
        let effects = restored.apply_state(&state);
        assert_eq!(
            effects
                .iter()
                .filter(|e| matches!(e, Effect::PersistState(_)))
                .count(),
            1
        );
        assert_eq!(restored.state(), state);
    }

    #[test]
    fn bad_state_segments_are_reported() {
        let mut s = Session::new(ProviderEndpoints::default());
        let (_, errors) = s.apply_state_str("#map=a/b/c&settings=hideCompletePOI");
        assert_eq!(errors.len(), 1);
        assert!(s.display().is_enabled("hideCompletePOI"));
        assert_eq!(s.view(), None);
    }

    #[test]
    fn hide_settings_restyle_every_loaded_point() {
        let mut s = session_with_dataset();
        let effects = s.set_view(Viewport::new(15, 50.8467, 4.3525));
        let keys: Vec<TileKey> = fetches(&effects).iter().map(|f| f.key.clone()).collect();
        s.tile_fetched(&keys[0], Ok(TILE.into()));
        s.tile_fetched(&keys[1], Err(FetchError::Status(404)));
        s.drain_events();

        s.change_setting(HIDE_MATCHED, true);
        assert_eq!(
            s.drain_events(),
            vec![
                SessionEvent::SettingChanged {
                    setting_id: HIDE_MATCHED.into(),
                    enabled: true
                },
                SessionEvent::PointRestyled {
                    key: keys[0].clone(),
                    index: 0
                },
            ]
        );

        // Unchanged values and unrelated settings redraw nothing.
        s.change_setting(HIDE_MATCHED, true);
        assert!(s.drain_events().is_empty());
        s.change_setting("satellite", true);
        assert!(
            !s.drain_events()
                .iter()
                .any(|e| matches!(e, SessionEvent::PointRestyled { .. }))
        );
        s.change_setting(HIDE_COMPLETE, true);
        assert_eq!(s.drain_events().len(), 2);
    }

    #[test]
    fn unusable_manifest_registers_nothing() {
        let mut s = Session::new(ProviderEndpoints::default());
        assert!(s.manifest_loaded("x", "u/", Ok(String::new())).is_empty());
        assert!(s.manifest_loaded("y", "u/", Err(FetchError::Status(500))).is_empty());
        assert!(s.datasets().is_empty());
    }
}
