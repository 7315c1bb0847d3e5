use std::path::PathBuf;
use std::time::Duration;

use taskdeck_core::CoreError;
use taskdeck_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid record: {0}")]
    Core(#[from] CoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid import: {0}")]
    Validation(String),
}

impl EngineError {
    pub(crate) fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync endpoint is not configured")]
    NotConfigured,

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("remote authority rejected the request ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("unexpected response from remote authority: {0}")]
    ProtocolMismatch(String),

    #[error("could not read local {collection}: {source}")]
    Read {
        collection: &'static str,
        source: EngineError,
    },

    #[error("replacing local {collection} failed, previous contents kept: {source}")]
    Replace {
        collection: &'static str,
        source: EngineError,
    },
}

impl SyncError {
    /// Human-readable failure reason for the user-facing prompt.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe failed: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
