//! Shareable session state string.
//!
//! Format: `map={zoom}/{lat}/{lon}&datasets={id};{id}&settings={id};{id}`.
//! Coordinates carry four decimals, identifiers are percent-encoded and empty
//! segments are left out. Decoding is per segment: a bad segment is reported
//! and skipped while the others still apply.

use std::collections::BTreeSet;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use compare::encode_component;
use foundation::LatLon;

/// Map view: zoom level and center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: u8,
    pub lat: f64,
    pub lon: f64,
}

impl Viewport {
    pub fn new(zoom: u8, lat: f64, lon: f64) -> Self {
        Self { zoom, lat, lon }
    }

    pub fn center(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub viewport: Option<Viewport>,
    pub datasets: BTreeSet<String>,
    pub settings: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("malformed map segment `{0}`")]
    Map(String),
    #[error("invalid percent-encoding in `{0}`")]
    Encoding(String),
}

pub fn encode(state: &SessionState) -> String {
    let mut segments = Vec::with_capacity(3);
    if let Some(v) = state.viewport {
        segments.push(format!("map={}/{:.4}/{:.4}", v.zoom, v.lat, v.lon));
    }
    if !state.datasets.is_empty() {
        segments.push(format!("datasets={}", join_ids(&state.datasets)));
    }
    if !state.settings.is_empty() {
        segments.push(format!("settings={}", join_ids(&state.settings)));
    }
    segments.join("&")
}

fn join_ids(ids: &BTreeSet<String>) -> String {
    ids.iter()
        .map(|id| encode_component(id))
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse a state string; a leading `#` is accepted.
pub fn decode(input: &str) -> (SessionState, Vec<StateError>) {
    let mut state = SessionState::default();
    let mut errors = Vec::new();
    let input = input.strip_prefix('#').unwrap_or(input);

    for segment in input.split('&') {
        if let Some(rest) = segment.strip_prefix("map=") {
            match parse_map(rest) {
                Some(v) => state.viewport = Some(v),
                None => errors.push(StateError::Map(segment.to_string())),
            }
        } else if let Some(rest) = segment.strip_prefix("datasets=") {
            decode_ids(rest, &mut state.datasets, &mut errors);
        } else if let Some(rest) = segment.strip_prefix("settings=") {
            decode_ids(rest, &mut state.settings, &mut errors);
        }
    }
    (state, errors)
}

fn parse_map(s: &str) -> Option<Viewport> {
    let mut parts = s.split('/');
    let zoom = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    let lon: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let valid = lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0;
    valid.then(|| Viewport::new(zoom, lat, lon))
}

fn decode_ids(list: &str, into: &mut BTreeSet<String>, errors: &mut Vec<StateError>) {
    for raw in list.split(';').filter(|s| !s.is_empty()) {
        match percent_decode_str(raw).decode_utf8() {
            Ok(id) => {
                into.insert(id.into_owned());
            }
            Err(_) => errors.push(StateError::Encoding(raw.to_string())),
        }
    }
}
