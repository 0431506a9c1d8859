//! Executes session effects over HTTP.
//!
//! All requests are polled on the calling task through one
//! `FuturesUnordered`; completions are fed back into the session one at a
//! time, so the session itself never needs a lock. Session events are
//! drained after every step and handed to the event sink, if any.

use std::cell::RefCell;
use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{debug, info, warn};

use compare::{BatchId, CompareError};
use streaming::{FetchError, SessionEvent, TileKey};

use crate::codec::encode;
use crate::http::{HttpClient, HttpError, HttpRequest, LocalBoxFuture};
use crate::orchestrator::{Effect, Session};
use crate::persist::SessionStore;

enum Completion {
    Manifest {
        dataset_id: String,
        base_url: String,
        outcome: Result<String, HttpError>,
    },
    Tile {
        key: TileKey,
        outcome: Result<String, HttpError>,
    },
    Query {
        batch: BatchId,
        outcome: Result<String, HttpError>,
    },
}

/// Counters for one [`Driver::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveReport {
    pub manifests: usize,
    pub tiles: usize,
    pub queries: usize,
    pub persisted: usize,
    pub events: usize,
}

/// Receives every session event together with the session it came from.
pub type EventSink<'a> = Box<dyn FnMut(&Session, SessionEvent) + 'a>;

pub struct Driver<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    store: Option<SessionStore>,
    clock: fn() -> u64,
    sink: Option<RefCell<EventSink<'a>>>,
}

impl<'a, C: HttpClient + ?Sized> Driver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            store: None,
            clock: unix_time_ms,
            sink: None,
        }
    }

    /// Forward drained session events to `sink`. Without a sink they are
    /// dropped.
    pub fn with_event_sink(mut self, sink: impl FnMut(&Session, SessionEvent) + 'a) -> Self {
        self.sink = Some(RefCell::new(Box::new(sink)));
        self
    }

    /// Persist state changes to `store`.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Execute `effects` and everything they lead to, until no request is in
    /// flight.
    pub async fn run(&self, session: &mut Session, effects: Vec<Effect>) -> DriveReport {
        let mut report = DriveReport::default();
        let mut queue: VecDeque<Effect> = effects.into();
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'a, Completion>> = FuturesUnordered::new();

        loop {
            report.events += self.forward_events(session);
            while let Some(effect) = queue.pop_front() {
                match effect {
                    Effect::PersistState(state) => {
                        if self.persist(&encode(&state)) {
                            report.persisted += 1;
                        }
                    }
                    effect => {
                        if let Some(request) = self.start(effect, &mut report) {
                            in_flight.push(request);
                        }
                    }
                }
            }

            let Some(done) = in_flight.next().await else {
                break;
            };
            let follow_up = match done {
                Completion::Manifest {
                    dataset_id,
                    base_url,
                    outcome,
                } => session.manifest_loaded(
                    &dataset_id,
                    &base_url,
                    outcome.map_err(FetchError::from),
                ),
                Completion::Tile { key, outcome } => {
                    session.tile_fetched(&key, outcome.map_err(FetchError::from))
                }
                Completion::Query { batch, outcome } => {
                    session.query_finished(batch, outcome.map_err(CompareError::from))
                }
            };
            queue.extend(follow_up);
        }
        report.events += self.forward_events(session);

        info!(
            manifests = report.manifests,
            tiles = report.tiles,
            queries = report.queries,
            "session idle"
        );
        report
    }

    fn start(&self, effect: Effect, report: &mut DriveReport) -> Option<LocalBoxFuture<'a, Completion>> {
        let client = self.client;
        let request: LocalBoxFuture<'a, Completion> = match effect {
            Effect::FetchManifest {
                dataset_id,
                base_url,
                url,
            } => {
                report.manifests += 1;
                Box::pin(async move {
                    let outcome = client.fetch_text(HttpRequest::get(url)).await;
                    Completion::Manifest {
                        dataset_id,
                        base_url,
                        outcome,
                    }
                })
            }
            Effect::FetchTile(fetch) => {
                report.tiles += 1;
                Box::pin(async move {
                    let outcome = client.fetch_text(HttpRequest::get(fetch.url)).await;
                    Completion::Tile {
                        key: fetch.key,
                        outcome,
                    }
                })
            }
            Effect::DispatchQuery(dispatch) => {
                report.queries += 1;
                debug!(batch = dispatch.batch, url = %dispatch.request.url, "sending comparison query");
                Box::pin(async move {
                    let outcome = client.fetch_text(dispatch.request.into()).await;
                    Completion::Query {
                        batch: dispatch.batch,
                        outcome,
                    }
                })
            }
            Effect::PersistState(_) => return None,
        };
        Some(request)
    }

    fn forward_events(&self, session: &mut Session) -> usize {
        let events = session.drain_events();
        let count = events.len();
        if let Some(sink) = &self.sink {
            let session: &Session = session;
            let sink = &mut *sink.borrow_mut();
            for event in events {
                sink(session, event);
            }
        }
        count
    }

    fn persist(&self, state: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.save(state, (self.clock)()) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %store.path().display(), "could not save state: {err}");
                false
            }
        }
    }
}

pub fn unix_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
