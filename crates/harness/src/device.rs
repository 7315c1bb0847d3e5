use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskdeck_engine::{
    ConnectivityState, EngineConfig, EngineError, EntityStore, SyncError, SyncOrchestrator,
};
use tempfile::TempDir;

/// One simulated install: a store in its own temp directory plus its connectivity flags.
pub struct TestDevice {
    pub store: Arc<EntityStore>,
    pub state: ConnectivityState,
    path: PathBuf,
    _dir: TempDir,
}

impl TestDevice {
    /// Starts offline, like a fresh launch before the first probe.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("taskdeck.db");
        Self::at(dir, path)
    }

    /// A device whose database file was prepared by the caller (e.g. an old schema).
    pub fn with_database(
        prepare: impl FnOnce(&Path) -> Result<(), Box<dyn std::error::Error>>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("taskdeck.db");
        prepare(&path)?;
        Self::at(dir, path)
    }

    fn at(dir: TempDir, path: PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let state = ConnectivityState::new();
        let store = EntityStore::open(&path, state.clone())?;
        Ok(Self {
            store: Arc::new(store),
            state,
            path,
            _dir: dir,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.path
    }

    pub fn go_online(&self) {
        self.state.set_online(true);
    }

    pub fn go_offline(&self) {
        self.state.set_online(false);
    }

    /// Simulate an app restart: a fresh store over the same file and flags.
    pub fn reopen(&mut self) -> Result<(), EngineError> {
        self.store = Arc::new(EntityStore::open(&self.path, self.state.clone())?);
        Ok(())
    }

    /// An orchestrator whose fallback authority URL is `api_url`.
    pub fn orchestrator(&self, api_url: Option<&str>) -> Result<SyncOrchestrator, SyncError> {
        let config = EngineConfig {
            database_path: self.path.clone(),
            api_url: api_url.map(str::to_string),
            ..EngineConfig::default()
        };
        SyncOrchestrator::new(Arc::clone(&self.store), config)
    }
}
