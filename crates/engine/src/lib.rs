pub mod config;
pub mod connectivity;
pub mod error;
pub mod state;
pub mod sync;
pub mod transfer;

pub use config::EngineConfig;
pub use connectivity::{
    ConnectivityMonitor, HttpProbe, PlatformSignal, Probe, ProbeOutcome,
};
pub use error::{ConfigError, EngineError, ProbeError, SyncError};
pub use state::ConnectivityState;
pub use sync::{BackendStatus, SyncCollection, SyncOrchestrator};
pub use transfer::{ImportSummary, Snapshot, SNAPSHOT_VERSION};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use serde_json::Value;
use taskdeck_core::{
    clock, default_categories, normalize_task, Category, CategoryId, Integration,
    NewCategory, NewTask, Setting, StoredTask, Task, TaskId, API_URL_SETTING,
};
use taskdeck_storage::{PriorityFix, RestoreSet, SqliteStorage, Storage, StorageError};

/// The local store: the sole source of truth the UI reads from.
///
/// Reads run directly against storage. Mutations of tasks and categories take the
/// collection's guard, so they queue behind an in-flight sync of that collection and
/// never interleave with its replace. Every user mutation made while offline raises
/// the pending-change flag on the shared [`ConnectivityState`].
pub struct EntityStore {
    storage: Mutex<SqliteStorage>,
    state: ConnectivityState,
    tasks_guard: tokio::sync::Mutex<()>,
    categories_guard: tokio::sync::Mutex<()>,
}

impl EntityStore {
    pub fn new(storage: SqliteStorage, state: ConnectivityState) -> Self {
        Self {
            storage: Mutex::new(storage),
            state,
            tasks_guard: tokio::sync::Mutex::new(()),
            categories_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Open (creating or upgrading) the database at `path`.
    pub fn open(path: impl AsRef<Path>, state: ConnectivityState) -> Result<Self, EngineError> {
        Ok(Self::new(SqliteStorage::open(path)?, state))
    }

    pub fn open_in_memory(state: ConnectivityState) -> Result<Self, EngineError> {
        Ok(Self::new(SqliteStorage::open_in_memory()?, state))
    }

    pub fn from_config(config: &EngineConfig, state: ConnectivityState) -> Result<Self, EngineError> {
        Self::open(&config.database_path, state)
    }

    pub fn connectivity(&self) -> &ConnectivityState {
        &self.state
    }

    pub fn schema_version(&self) -> Result<i32, EngineError> {
        self.with_storage(|s| s.schema_version())
    }

    fn with_storage<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> Result<T, StorageError>,
    ) -> Result<T, EngineError> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::Unavailable("storage handle poisoned".into()))?;
        f(&mut *storage).map_err(EngineError::from_storage)
    }

    fn note_local_change(&self, collection: &'static str) {
        if self.state.record_local_change() {
            tracing::debug!(collection, "local change recorded while offline");
        }
    }

    /// Serializes against mutations of the same collection, including sync.
    pub(crate) async fn lock_collection(
        &self,
        collection: SyncCollection,
    ) -> tokio::sync::MutexGuard<'_, ()> {
        match collection {
            SyncCollection::Todos => self.tasks_guard.lock().await,
            SyncCollection::Categories => self.categories_guard.lock().await,
        }
    }

    // ---- Tasks ----

    pub async fn add_task(&self, task: NewTask) -> Result<TaskId, EngineError> {
        task.validate()?;
        let _guard = self.tasks_guard.lock().await;
        let timestamp = clock::now_ms()?;
        let id = self.with_storage(|s| s.insert_task(&task, timestamp))?;
        self.note_local_change("todos");
        tracing::debug!(%id, "task added");
        Ok(id)
    }

    /// Every task, migrated to the current shape.
    ///
    /// Rows that needed migration are written back after the read. A failed write-back
    /// is logged and retried on the next read; the caller still gets migrated records.
    pub fn get_all_tasks(&self) -> Result<Vec<Task>, EngineError> {
        let stored = self.with_storage(|s| s.get_tasks())?;
        Ok(self.migrate_on_read(stored))
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>, EngineError> {
        let stored = self.with_storage(|s| s.get_task(id))?;
        Ok(stored.and_then(|row| self.migrate_on_read(vec![row]).pop()))
    }

    pub fn get_tasks_by_status(&self, completed: bool) -> Result<Vec<Task>, EngineError> {
        let stored = self.with_storage(|s| s.get_tasks_by_status(completed))?;
        Ok(self.migrate_on_read(stored))
    }

    fn migrate_on_read(&self, stored: Vec<StoredTask>) -> Vec<Task> {
        let mut fixes = Vec::new();
        let tasks = stored
            .into_iter()
            .map(|row| {
                let id = row.id;
                let observed = row.priority.clone();
                let (task, changed) = normalize_task(row);
                if changed {
                    fixes.push(PriorityFix {
                        id,
                        observed,
                        priority: task.priority,
                    });
                }
                task
            })
            .collect();

        if !fixes.is_empty() {
            match self.with_storage(|s| s.apply_priority_fixes(&fixes)) {
                Ok(rewritten) => tracing::info!(rewritten, "migrated task records on read"),
                Err(e) => tracing::warn!(
                    error = %e,
                    pending = fixes.len(),
                    "migration write-back failed, retrying on next read"
                ),
            }
        }
        tasks
    }

    /// Replace every field of an existing task except its creation timestamp.
    pub async fn update_task(&self, task: &Task) -> Result<(), EngineError> {
        task.validate()?;
        let _guard = self.tasks_guard.lock().await;
        self.with_storage(|s| s.update_task(task))?;
        self.note_local_change("todos");
        Ok(())
    }

    /// Flip `completed`. Returns the updated task, or `None` if the id is unknown.
    pub async fn toggle_task(&self, id: TaskId) -> Result<Option<Task>, EngineError> {
        let _guard = self.tasks_guard.lock().await;
        let Some(row) = self.with_storage(|s| s.get_task(id))? else {
            return Ok(None);
        };
        let (mut task, _) = normalize_task(row);
        task.completed = !task.completed;
        self.with_storage(|s| s.update_task(&task))?;
        self.note_local_change("todos");
        Ok(Some(task))
    }

    /// Deleting an unknown id is a no-op.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), EngineError> {
        let _guard = self.tasks_guard.lock().await;
        self.with_storage(|s| s.delete_task(id))?;
        self.note_local_change("todos");
        Ok(())
    }

    pub async fn clear_tasks(&self) -> Result<(), EngineError> {
        let _guard = self.tasks_guard.lock().await;
        self.with_storage(|s| s.clear_tasks())?;
        self.note_local_change("todos");
        Ok(())
    }

    /// Caller holds the todos guard.
    pub(crate) fn replace_tasks(&self, tasks: &[(NewTask, i64)]) -> Result<usize, EngineError> {
        let ids = self.with_storage(|s| s.replace_tasks(tasks))?;
        Ok(ids.len())
    }

    // ---- Categories ----

    pub async fn add_category(&self, category: NewCategory) -> Result<CategoryId, EngineError> {
        let _guard = self.categories_guard.lock().await;
        let id = self.with_storage(|s| s.insert_category(&category))?;
        self.note_local_change("categories");
        tracing::debug!(%id, name = %category.name, "category added");
        Ok(id)
    }

    /// Every category. An empty collection is seeded with the defaults first.
    pub fn get_all_categories(&self) -> Result<Vec<Category>, EngineError> {
        let defaults = default_categories();
        let seeded = self.with_storage(|s| s.seed_categories_if_empty(&defaults))?;
        if seeded {
            tracing::info!(count = defaults.len(), "seeded default categories");
        }
        self.with_storage(|s| s.get_categories())
    }

    /// Categories with `count` recomputed from the task collection.
    pub fn get_categories_with_counts(&self) -> Result<Vec<Category>, EngineError> {
        let mut categories = self.get_all_categories()?;
        let counts: HashMap<CategoryId, i64> = self
            .with_storage(|s| s.count_tasks_by_category())?
            .into_iter()
            .collect();
        for category in &mut categories {
            category.count = counts.get(&category.id).copied().unwrap_or(0);
        }
        Ok(categories)
    }

    pub fn get_category(&self, id: CategoryId) -> Result<Option<Category>, EngineError> {
        self.with_storage(|s| s.get_category(id))
    }

    pub async fn update_category(&self, category: &Category) -> Result<(), EngineError> {
        let _guard = self.categories_guard.lock().await;
        self.with_storage(|s| s.update_category(category))?;
        self.note_local_change("categories");
        Ok(())
    }

    /// Tasks keep their dangling category reference.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), EngineError> {
        let _guard = self.categories_guard.lock().await;
        self.with_storage(|s| s.delete_category(id))?;
        self.note_local_change("categories");
        Ok(())
    }

    pub async fn clear_categories(&self) -> Result<(), EngineError> {
        let _guard = self.categories_guard.lock().await;
        self.with_storage(|s| s.clear_categories())?;
        self.note_local_change("categories");
        Ok(())
    }

    /// Caller holds the categories guard.
    pub(crate) fn replace_categories(&self, categories: &[NewCategory]) -> Result<usize, EngineError> {
        let ids = self.with_storage(|s| s.replace_categories(categories))?;
        Ok(ids.len())
    }

    // ---- Integrations ----

    pub fn put_integration(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let integration = Integration {
            key: key.to_string(),
            value,
            timestamp: clock::now_ms()?,
        };
        self.with_storage(|s| s.put_integration(&integration))?;
        self.note_local_change("integrations");
        Ok(())
    }

    pub fn get_integration(&self, key: &str) -> Result<Option<Integration>, EngineError> {
        self.with_storage(|s| s.get_integration(key))
    }

    pub fn get_all_integrations(&self) -> Result<Vec<Integration>, EngineError> {
        self.with_storage(|s| s.get_integrations())
    }

    pub fn delete_integration(&self, key: &str) -> Result<(), EngineError> {
        self.with_storage(|s| s.delete_integration(key))?;
        self.note_local_change("integrations");
        Ok(())
    }

    pub fn clear_integrations(&self) -> Result<(), EngineError> {
        self.with_storage(|s| s.clear_integrations())?;
        self.note_local_change("integrations");
        Ok(())
    }

    // ---- Settings ----

    pub fn put_setting(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let setting = Setting {
            key: key.to_string(),
            value,
            timestamp: clock::now_ms()?,
        };
        self.with_storage(|s| s.put_setting(&setting))?;
        self.note_local_change("settings");
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<Setting>, EngineError> {
        self.with_storage(|s| s.get_setting(key))
    }

    pub fn get_all_settings(&self) -> Result<Vec<Setting>, EngineError> {
        self.with_storage(|s| s.get_settings())
    }

    pub fn delete_setting(&self, key: &str) -> Result<(), EngineError> {
        self.with_storage(|s| s.delete_setting(key))?;
        self.note_local_change("settings");
        Ok(())
    }

    pub fn clear_settings(&self) -> Result<(), EngineError> {
        self.with_storage(|s| s.clear_settings())?;
        self.note_local_change("settings");
        Ok(())
    }

    /// The `apiUrl` setting, if it holds a non-blank string.
    pub fn api_url_setting(&self) -> Result<Option<String>, EngineError> {
        let setting = self.get_setting(API_URL_SETTING)?;
        Ok(setting.and_then(|s| match s.value {
            Value::String(url) if !url.trim().is_empty() => Some(url),
            _ => None,
        }))
    }

    /// Destructive restore. Caller holds both collection guards.
    pub(crate) fn restore(&self, set: RestoreSet<'_>) -> Result<(), EngineError> {
        self.with_storage(|s| s.restore(set))
    }
}
