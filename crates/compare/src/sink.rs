use tracing::debug;

use streaming::{DatasetRegistry, EventBus, SessionEvent, TileKey, TileStore};

use crate::provider::{Candidate, QueryProvider};

/// Distribute a batch's candidates onto the points of the tiles that were in
/// that batch. Returns the number of points scored.
///
/// Tiles whose dataset is no longer registered are skipped.
pub fn apply_results(
    store: &mut TileStore,
    datasets: &DatasetRegistry,
    tiles: &[TileKey],
    candidates: &[Candidate],
    provider: &dyn QueryProvider,
    events: &mut EventBus,
) -> usize {
    let mut scored = 0;
    for key in tiles {
        let Some(settings) = datasets.get(&key.dataset_id) else {
            continue;
        };
        let Some(points) = store.points_mut(key) else {
            continue;
        };
        for (index, point) in points.iter_mut().enumerate() {
            point.comparison = Some(provider.compare(settings, point, candidates));
            events.emit(SessionEvent::PointScored {
                key: key.clone(),
                index,
            });
            scored += 1;
        }
    }
    debug!(
        provider = %provider.kind(),
        tiles = tiles.len(),
        candidates = candidates.len(),
        scored,
        "applied comparison results"
    );
    scored
}
