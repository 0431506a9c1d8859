use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use compare::ProviderEndpoints;

pub const ENV_OVERPASS_URL: &str = "POI_OVERPASS_URL";
pub const ENV_WIKIDATA_URL: &str = "POI_WIKIDATA_URL";
pub const ENV_STATE_FILE: &str = "POI_STATE_FILE";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "POI_HTTP_TIMEOUT_SECS";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid endpoints file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime configuration for a client session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoints: ProviderEndpoints,
    pub state_file: Option<PathBuf>,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::default(),
            state_file: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults, then `endpoints_file`, then the process environment.
    pub fn load(endpoints_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(endpoints_file, |key| std::env::var(key).ok())
    }

    pub fn load_with(
        endpoints_file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = endpoints_file {
            config.endpoints = read_endpoints(path)?;
        }

        if let Some(url) = env(ENV_OVERPASS_URL) {
            config.endpoints.osm.url = url;
        }
        if let Some(url) = env(ENV_WIKIDATA_URL) {
            config.endpoints.wikidata.url = url;
        }
        if let Some(path) = env(ENV_STATE_FILE).filter(|p| !p.is_empty()) {
            config.state_file = Some(PathBuf::from(path));
        }
        if let Some(secs) = env(ENV_HTTP_TIMEOUT_SECS) {
            let parsed = secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: ENV_HTTP_TIMEOUT_SECS,
                    value: secs.clone(),
                })?;
            config.http_timeout = Duration::from_secs(parsed);
        }
        Ok(config)
    }
}

/// Read provider endpoints from JSON; providers missing from the file keep
/// their defaults.
pub fn read_endpoints(path: &Path) -> Result<ProviderEndpoints, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let endpoints = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded provider endpoints");
    Ok(endpoints)
}
