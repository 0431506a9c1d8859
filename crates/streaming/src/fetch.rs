use tracing::{debug, warn};

use crate::dataset::DatasetSettings;
use crate::decode::{DecodeError, decode_point_features};
use crate::events::{EventBus, SessionEvent};
use crate::store::{TileKey, TileStore};

/// A tile download the driver should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFetch {
    pub key: TileKey,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Issues per-tile dataset fetches and turns their responses into points.
///
/// Fetch planning marks tiles Loading before anything goes on the wire, so a
/// second viewport pass over the same tiles produces no fetches.
#[derive(Debug, Default)]
pub struct FetchCoordinator {
    issued: u64,
    failed: u64,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn tile_url(dataset: &DatasetSettings, key: &TileKey) -> String {
        dataset.resource_url(&format!("data/{}.json", key.name()))
    }

    /// Plan fetches for every key that has never been requested.
    pub fn ensure_tiles_loaded(
        &mut self,
        store: &mut TileStore,
        dataset: &DatasetSettings,
        keys: &[TileKey],
    ) -> Vec<TileFetch> {
        let mut fetches = Vec::new();
        for key in keys {
            if !store.mark_loading(key) {
                continue;
            }
            let url = Self::tile_url(dataset, key);
            debug!(tile = %key, %url, "fetching tile");
            fetches.push(TileFetch {
                key: key.clone(),
                url,
            });
        }
        self.issued += fetches.len() as u64;
        fetches
    }

    /// Record a finished tile fetch. Returns the number of points added.
    ///
    /// Any failure leaves the tile Failed with no points; it is not retried.
    pub fn complete(
        &mut self,
        store: &mut TileStore,
        key: &TileKey,
        outcome: Result<String, FetchError>,
        events: &mut EventBus,
    ) -> usize {
        let points = outcome.and_then(|body| Ok(decode_point_features(&body)?));
        match points {
            Ok(points) => {
                let count = points.len();
                if !store.record_loaded(key, points) {
                    return 0;
                }
                for index in 0..count {
                    events.emit(SessionEvent::PointAdded {
                        key: key.clone(),
                        index,
                    });
                }
                debug!(tile = %key, count, "tile loaded");
                count
            }
            Err(err) => {
                if store.record_failed(key) {
                    self.failed += 1;
                    warn!(tile = %key, "tile fetch failed: {err}");
                }
                0
            }
        }
    }
}
