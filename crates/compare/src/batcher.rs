//! Batched comparison queries with a single query in flight.
//!
//! State machine: Idle → Busy → (Idle | Busy).
//!
//! - A scheduling pass while Busy only sets `waiting`; any number of such
//!   passes collapse into one follow-up.
//! - A pass while Idle collects every eligible tile of the first provider
//!   kind it meets, marks those tiles queried, and emits one dispatch. Tiles
//!   of other kinds set `waiting` and are served on a later round.
//! - Completion (success or failure) returns to Idle and, if `waiting`, runs
//!   the follow-up pass right away.

use tracing::{debug, info, warn};

use foundation::tile_to_bbox;
use streaming::{DatasetRegistry, EventBus, ProviderKind, TileKey, TileStore};

use crate::error::CompareError;
use crate::provider::{QueryProvider, provider_for};
use crate::sink::apply_results;
use crate::transport::{ProviderEndpoints, QueryRequest};

pub type BatchId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStatus {
    pub busy: bool,
    pub waiting: bool,
    pub active_provider: Option<ProviderKind>,
}

/// A comparison query ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDispatch {
    pub batch: BatchId,
    pub provider: ProviderKind,
    /// Unencoded query text.
    pub query: String,
    pub request: QueryRequest,
    /// Tiles included in this batch, in query order.
    pub tiles: Vec<TileKey>,
}

#[derive(Debug)]
struct InFlight {
    batch: BatchId,
    provider: ProviderKind,
    tiles: Vec<TileKey>,
}

#[derive(Debug)]
pub struct QueryBatcher {
    status: QueryStatus,
    endpoints: ProviderEndpoints,
    in_flight: Option<InFlight>,
    next_batch: BatchId,
    dispatched: u64,
}

impl QueryBatcher {
    pub fn new(endpoints: ProviderEndpoints) -> Self {
        Self {
            status: QueryStatus::default(),
            endpoints,
            in_flight: None,
            next_batch: 1,
            dispatched: 0,
        }
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// Number of queries sent so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Run a scheduling pass over every registered dataset. Visibility only
    /// governs loading: tiles loaded before a dataset was hidden still get
    /// compared.
    pub fn schedule(
        &mut self,
        datasets: &DatasetRegistry,
        store: &mut TileStore,
    ) -> Option<QueryDispatch> {
        if self.status.busy {
            self.status.waiting = true;
            return None;
        }
        self.status.waiting = false;

        let mut chosen: Option<(&'static dyn QueryProvider, String)> = None;
        let mut tiles: Vec<TileKey> = Vec::new();

        for settings in datasets.iter() {
            let eligible = store.eligible(&settings.identifier);
            if eligible.is_empty() {
                continue;
            }

            if let Some((active, _)) = &chosen
                && active.kind() != settings.query_type
            {
                self.status.waiting = true;
                continue;
            }
            let provider = provider_for(settings.query_type);
            let (_, query) = chosen.get_or_insert_with(|| (provider, provider.init_query()));

            for key in eligible {
                let bbox =
                    tile_to_bbox(key.tile.x, key.tile.y, settings.zoom).padded(settings.dist);
                provider.add_item(query, settings, bbox, &key.name());
                store.mark_externally_queried(&key);
                tiles.push(key);
            }
        }

        let (provider, query) = chosen?;
        let query = provider.finish_query(query);
        debug!("query:\n{query}");

        let kind = provider.kind();
        let request = self.endpoints.get(kind).request_for(&query);
        let batch = self.next_batch;
        self.next_batch += 1;
        self.dispatched += 1;
        self.status.busy = true;
        self.status.active_provider = Some(kind);
        self.in_flight = Some(InFlight {
            batch,
            provider: kind,
            tiles: tiles.clone(),
        });

        info!(
            batch,
            provider = %kind,
            tiles = tiles.len(),
            method = %request.method,
            waiting = self.status.waiting,
            "dispatching comparison query"
        );

        Some(QueryDispatch {
            batch,
            provider: kind,
            query,
            request,
            tiles,
        })
    }

    /// Handle the response to `batch`. Failures are logged and dropped: the
    /// batch's tiles stay queried and unscored.
    ///
    /// Returns the follow-up dispatch when work arrived while busy.
    pub fn complete(
        &mut self,
        batch: BatchId,
        outcome: Result<String, CompareError>,
        datasets: &DatasetRegistry,
        store: &mut TileStore,
        events: &mut EventBus,
    ) -> Option<QueryDispatch> {
        let in_flight = match self.in_flight.take() {
            Some(f) if f.batch == batch => f,
            other => {
                warn!(batch, "ignoring response for a batch that is not in flight");
                self.in_flight = other;
                return None;
            }
        };
        self.status.busy = false;
        self.status.active_provider = None;

        let provider = provider_for(in_flight.provider);
        let parsed = outcome.and_then(|body| {
            if body.trim().is_empty() {
                return Err(CompareError::Empty);
            }
            provider.parse_results(&body)
        });
        match parsed {
            Ok(candidates) => {
                apply_results(
                    store,
                    datasets,
                    &in_flight.tiles,
                    &candidates,
                    provider,
                    events,
                );
            }
            Err(err) => {
                warn!(batch, provider = %in_flight.provider, "comparison query failed: {err}");
            }
        }

        if self.status.waiting {
            return self.schedule(datasets, store);
        }
        None
    }
}
