use taskdeck_core::{
    Category, CategoryId, Integration, NewCategory, NewTask, Priority, Setting, StoredTask,
    Task, TaskId,
};

use crate::error::StorageError;

/// A lazily-migrated priority to persist. Applied only while the row still holds
/// `observed`, so a concurrent full-record update is never clobbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityFix {
    pub id: TaskId,
    pub observed: Option<String>,
    pub priority: Priority,
}

/// Full contents for a destructive restore. `settings: None` leaves settings alone.
#[derive(Debug, Clone, Copy)]
pub struct RestoreSet<'a> {
    pub tasks: &'a [Task],
    pub categories: &'a [Category],
    pub integrations: &'a [Integration],
    pub settings: Option<&'a [Setting]>,
}

/// Each method runs in its own transaction.
pub trait Storage {
    fn schema_version(&self) -> Result<i32, StorageError>;

    // Tasks

    fn insert_task(&mut self, task: &NewTask, timestamp: i64) -> Result<TaskId, StorageError>;

    fn get_tasks(&self) -> Result<Vec<StoredTask>, StorageError>;

    fn get_task(&self, id: TaskId) -> Result<Option<StoredTask>, StorageError>;

    fn get_tasks_by_status(&self, completed: bool) -> Result<Vec<StoredTask>, StorageError>;

    /// Replace every field except `timestamp`. `NotFound` if the id does not exist.
    fn update_task(&mut self, task: &Task) -> Result<(), StorageError>;

    /// Returns how many rows were rewritten.
    fn apply_priority_fixes(&mut self, fixes: &[PriorityFix]) -> Result<usize, StorageError>;

    fn delete_task(&mut self, id: TaskId) -> Result<(), StorageError>;

    fn clear_tasks(&mut self) -> Result<(), StorageError>;

    /// Clear the collection and insert `tasks` with fresh ids, atomically.
    fn replace_tasks(&mut self, tasks: &[(NewTask, i64)]) -> Result<Vec<TaskId>, StorageError>;

    fn count_tasks_by_category(&self) -> Result<Vec<(CategoryId, i64)>, StorageError>;

    // Categories

    fn insert_category(&mut self, category: &NewCategory) -> Result<CategoryId, StorageError>;

    /// Insert `defaults` only if the collection is empty. Returns whether it seeded.
    fn seed_categories_if_empty(&mut self, defaults: &[NewCategory]) -> Result<bool, StorageError>;

    fn get_categories(&self) -> Result<Vec<Category>, StorageError>;

    fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError>;

    fn update_category(&mut self, category: &Category) -> Result<(), StorageError>;

    fn delete_category(&mut self, id: CategoryId) -> Result<(), StorageError>;

    fn clear_categories(&mut self) -> Result<(), StorageError>;

    fn replace_categories(
        &mut self,
        categories: &[NewCategory],
    ) -> Result<Vec<CategoryId>, StorageError>;

    // Integrations

    fn put_integration(&mut self, integration: &Integration) -> Result<(), StorageError>;

    fn get_integration(&self, key: &str) -> Result<Option<Integration>, StorageError>;

    fn get_integrations(&self) -> Result<Vec<Integration>, StorageError>;

    fn delete_integration(&mut self, key: &str) -> Result<(), StorageError>;

    fn clear_integrations(&mut self) -> Result<(), StorageError>;

    // Settings

    fn put_setting(&mut self, setting: &Setting) -> Result<(), StorageError>;

    fn get_setting(&self, key: &str) -> Result<Option<Setting>, StorageError>;

    fn get_settings(&self) -> Result<Vec<Setting>, StorageError>;

    fn delete_setting(&mut self, key: &str) -> Result<(), StorageError>;

    fn clear_settings(&mut self) -> Result<(), StorageError>;

    // Whole store

    /// Clear tasks, categories, integrations (and settings when given) and insert the
    /// records with their own ids, atomically.
    fn restore(&mut self, set: RestoreSet<'_>) -> Result<(), StorageError>;
}
