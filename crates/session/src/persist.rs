use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::debug;

use compare::encode_component;

/// Stored state stays valid for one year.
pub const STATE_TTL_MS: u64 = 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored state is not valid percent-encoded utf-8")]
    Encoding,
}

/// On-disk record: the url-encoded state string and when it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    state: String,
    expires_at_ms: u64,
}

/// Remembers the last state string between runs, like a browser cookie.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored state string, or `None` when nothing is stored or it has
    /// expired.
    pub fn load(&self, now_ms: u64) -> Result<Option<String>, PersistError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredState = serde_json::from_str(&text)?;
        if stored.expires_at_ms <= now_ms {
            debug!(path = %self.path.display(), "stored state expired");
            return Ok(None);
        }
        let state = percent_decode_str(&stored.state)
            .decode_utf8()
            .map_err(|_| PersistError::Encoding)?;
        Ok(Some(state.into_owned()))
    }

    /// Write `state` with a fresh one-year expiry. The file is replaced
    /// atomically.
    pub fn save(&self, state: &str, now_ms: u64) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredState {
            state: encode_component(state),
            expires_at_ms: now_ms.saturating_add(STATE_TTL_MS),
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&stored)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Pick the state to restore: a non-empty URL fragment wins over the stored
/// state.
pub fn resolve_state(fragment: Option<&str>, stored: Option<String>) -> Option<String> {
    match fragment.map(|f| f.strip_prefix('#').unwrap_or(f)) {
        Some(f) if !f.is_empty() => Some(f.to_string()),
        _ => stored.filter(|s| !s.is_empty()),
    }
}

pub fn fragment(state: &str) -> String {
    format!("#{state}")
}
