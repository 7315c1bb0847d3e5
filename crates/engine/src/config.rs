use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_PROBE_URL: &str = "https://www.google.com/favicon.ico";
pub const DEFAULT_BACKEND_MESSAGE: &str = "Todo sync service is running";

/// Engine settings, usually read from a TOML file. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    /// Fallback remote authority base URL when the `apiUrl` setting is unset.
    pub api_url: Option<String>,
    pub probe_url: String,
    pub probe_timeout_ms: u64,
    pub probe_interval_secs: u64,
    pub sync_timeout_secs: u64,
    /// Exact `message` the authority's `/health` endpoint must report.
    pub backend_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("taskdeck.db"),
            api_url: None,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout_ms: 3_000,
            probe_interval_secs: 30,
            sync_timeout_secs: 30,
            backend_message: DEFAULT_BACKEND_MESSAGE.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}
