use std::path::Path;

use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use serde_json::Value;

use taskdeck_core::{
    Category, CategoryId, Color, CoreError, Integration, NewCategory, NewTask, Setting,
    StoredTask, Task, TaskId,
};

use crate::error::StorageError;
use crate::schema::{self, SchemaUpgrade};
use crate::traits::{PriorityFix, RestoreSet, Storage};

const TASK_COLUMNS: &str = "id, title, description, priority, category, completed, timestamp";
const CATEGORY_COLUMNS: &str = "id, name, description, color, count";

pub struct SqliteStorage {
    conn: Connection,
    upgrade: SchemaUpgrade,
}

impl SqliteStorage {
    /// Open (creating if needed) the store at `path` and bring its schema current.
    /// Safe to call repeatedly; every call gets its own connection to the same file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        let upgrade = schema::init_schema(&conn)?;
        tracing::debug!(path = %path.as_ref().display(), version = upgrade.to, "store opened");
        Ok(Self { conn, upgrade })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let upgrade = schema::init_schema(&conn)?;
        Ok(Self { conn, upgrade })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// What the schema pass did when this handle was opened.
    pub fn schema_upgrade(&self) -> SchemaUpgrade {
        self.upgrade
    }

    pub fn schema_objects(&self) -> Result<Vec<(String, String)>, StorageError> {
        schema::schema_objects(&self.conn)
    }
}

/// Tunnel a conversion failure through rusqlite's error type from inside row closures.
fn conversion(idx: usize, ty: Type, err: CoreError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn read_task(row: &Row) -> rusqlite::Result<StoredTask> {
    let id: i64 = row.get(0)?;
    let category: Option<i64> = row.get(4)?;
    Ok(StoredTask {
        id: TaskId::from_i64(id).map_err(|e| conversion(0, Type::Integer, e))?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: row.get(3)?,
        category: category
            .map(CategoryId::from_i64)
            .transpose()
            .map_err(|e| conversion(4, Type::Integer, e))?,
        completed: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

fn read_category(row: &Row) -> rusqlite::Result<Category> {
    let id: i64 = row.get(0)?;
    let color: String = row.get(3)?;
    Ok(Category {
        id: CategoryId::from_i64(id).map_err(|e| conversion(0, Type::Integer, e))?,
        name: row.get(1)?,
        description: row.get(2)?,
        color: Color::parse(&color).map_err(|e| conversion(3, Type::Text, e))?,
        count: row.get(4)?,
    })
}

fn insert_task_row(
    conn: &Connection,
    task: &NewTask,
    timestamp: i64,
) -> Result<TaskId, StorageError> {
    conn.execute(
        "INSERT INTO tasks (title, description, priority, category, completed, timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            task.title,
            task.description,
            task.priority.as_str(),
            task.category.map(|c| c.as_i64()),
            task.completed,
            timestamp,
        ],
    )?;
    Ok(TaskId::from_i64(conn.last_insert_rowid())?)
}

fn insert_category_row(
    conn: &Connection,
    category: &NewCategory,
) -> Result<CategoryId, StorageError> {
    conn.execute(
        "INSERT INTO categories (name, description, color, count) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            category.name,
            category.description,
            category.color.as_str(),
            category.count,
        ],
    )?;
    Ok(CategoryId::from_i64(conn.last_insert_rowid())?)
}

// Integrations and settings share one layout: key, msgpack value, timestamp.

#[derive(Debug, Clone, Copy)]
enum KeyedTable {
    Integrations,
    Settings,
}

impl KeyedTable {
    fn name(self) -> &'static str {
        match self {
            Self::Integrations => "integrations",
            Self::Settings => "settings",
        }
    }
}

type KeyedRow = (String, Value, i64);

fn encode_value(value: &Value) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn read_keyed(row: &Row) -> rusqlite::Result<KeyedRow> {
    let key: String = row.get(0)?;
    let bytes: Vec<u8> = row.get(1)?;
    let value: Value = rmp_serde::from_slice(&bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Blob, Box::new(e)))?;
    Ok((key, value, row.get(2)?))
}

fn put_keyed(
    conn: &Connection,
    table: KeyedTable,
    key: &str,
    value: &Value,
    timestamp: i64,
) -> Result<(), StorageError> {
    let bytes = encode_value(value)?;
    conn.execute(
        &format!(
            "INSERT INTO {t} (key, value, timestamp) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, timestamp = excluded.timestamp",
            t = table.name()
        ),
        rusqlite::params![key, bytes, timestamp],
    )?;
    Ok(())
}

fn get_keyed(
    conn: &Connection,
    table: KeyedTable,
    key: &str,
) -> Result<Option<KeyedRow>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT key, value, timestamp FROM {} WHERE key = ?1", table.name()),
            rusqlite::params![key],
            read_keyed,
        )
        .optional()?;
    Ok(row)
}

fn list_keyed(conn: &Connection, table: KeyedTable) -> Result<Vec<KeyedRow>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT key, value, timestamp FROM {} ORDER BY key",
        table.name()
    ))?;
    let rows = stmt
        .query_map([], read_keyed)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn delete_keyed(conn: &Connection, table: KeyedTable, key: &str) -> Result<(), StorageError> {
    conn.execute(
        &format!("DELETE FROM {} WHERE key = ?1", table.name()),
        rusqlite::params![key],
    )?;
    Ok(())
}

fn clear_keyed(conn: &Connection, table: KeyedTable) -> Result<(), StorageError> {
    conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn schema_version(&self) -> Result<i32, StorageError> {
        schema::stored_version(&self.conn)
    }

    fn insert_task(&mut self, task: &NewTask, timestamp: i64) -> Result<TaskId, StorageError> {
        insert_task_row(&self.conn, task, timestamp)
    }

    fn get_tasks(&self) -> Result<Vec<StoredTask>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"))?;
        let tasks = stmt
            .query_map([], read_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn get_task(&self, id: TaskId) -> Result<Option<StoredTask>, StorageError> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                rusqlite::params![id.as_i64()],
                read_task,
            )
            .optional()?;
        Ok(task)
    }

    fn get_tasks_by_status(&self, completed: bool) -> Result<Vec<StoredTask>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE completed = ?1 ORDER BY id"
        ))?;
        let tasks = stmt
            .query_map(rusqlite::params![completed], read_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn update_task(&mut self, task: &Task) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, category = ?4, completed = ?5 WHERE id = ?6",
            rusqlite::params![
                task.title,
                task.description,
                task.priority.as_str(),
                task.category.map(|c| c.as_i64()),
                task.completed,
                task.id.as_i64(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    fn apply_priority_fixes(&mut self, fixes: &[PriorityFix]) -> Result<usize, StorageError> {
        let tx = self.conn.transaction()?;
        let mut rewritten = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE tasks SET priority = ?1 WHERE id = ?2 AND priority IS ?3")?;
            for fix in fixes {
                rewritten += stmt.execute(rusqlite::params![
                    fix.priority.as_str(),
                    fix.id.as_i64(),
                    fix.observed,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rewritten)
    }

    fn delete_task(&mut self, id: TaskId) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id.as_i64()])?;
        Ok(())
    }

    fn clear_tasks(&mut self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM tasks", [])?;
        Ok(())
    }

    fn replace_tasks(&mut self, tasks: &[(NewTask, i64)]) -> Result<Vec<TaskId>, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tasks", [])?;
        let mut ids = Vec::with_capacity(tasks.len());
        for (task, timestamp) in tasks {
            ids.push(insert_task_row(&tx, task, *timestamp)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn count_tasks_by_category(&self) -> Result<Vec<(CategoryId, i64)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM tasks WHERE category IS NOT NULL GROUP BY category",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((id, count))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, count) = row?;
            result.push((CategoryId::from_i64(id)?, count));
        }
        Ok(result)
    }

    fn insert_category(&mut self, category: &NewCategory) -> Result<CategoryId, StorageError> {
        insert_category_row(&self.conn, category)
    }

    fn seed_categories_if_empty(&mut self, defaults: &[NewCategory]) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(false);
        }
        for category in defaults {
            insert_category_row(&tx, category)?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn get_categories(&self) -> Result<Vec<Category>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id"))?;
        let categories = stmt
            .query_map([], read_category)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                rusqlite::params![id.as_i64()],
                read_category,
            )
            .optional()?;
        Ok(category)
    }

    fn update_category(&mut self, category: &Category) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE categories SET name = ?1, description = ?2, color = ?3, count = ?4 WHERE id = ?5",
            rusqlite::params![
                category.name,
                category.description,
                category.color.as_str(),
                category.count,
                category.id.as_i64(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("category {}", category.id)));
        }
        Ok(())
    }

    fn delete_category(&mut self, id: CategoryId) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM categories WHERE id = ?1",
            rusqlite::params![id.as_i64()],
        )?;
        Ok(())
    }

    fn clear_categories(&mut self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM categories", [])?;
        Ok(())
    }

    fn replace_categories(
        &mut self,
        categories: &[NewCategory],
    ) -> Result<Vec<CategoryId>, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM categories", [])?;
        let mut ids = Vec::with_capacity(categories.len());
        for category in categories {
            ids.push(insert_category_row(&tx, category)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn put_integration(&mut self, integration: &Integration) -> Result<(), StorageError> {
        put_keyed(
            &self.conn,
            KeyedTable::Integrations,
            &integration.key,
            &integration.value,
            integration.timestamp,
        )
    }

    fn get_integration(&self, key: &str) -> Result<Option<Integration>, StorageError> {
        let row = get_keyed(&self.conn, KeyedTable::Integrations, key)?;
        Ok(row.map(|(key, value, timestamp)| Integration { key, value, timestamp }))
    }

    fn get_integrations(&self) -> Result<Vec<Integration>, StorageError> {
        let rows = list_keyed(&self.conn, KeyedTable::Integrations)?;
        Ok(rows
            .into_iter()
            .map(|(key, value, timestamp)| Integration { key, value, timestamp })
            .collect())
    }

    fn delete_integration(&mut self, key: &str) -> Result<(), StorageError> {
        delete_keyed(&self.conn, KeyedTable::Integrations, key)
    }

    fn clear_integrations(&mut self) -> Result<(), StorageError> {
        clear_keyed(&self.conn, KeyedTable::Integrations)
    }

    fn put_setting(&mut self, setting: &Setting) -> Result<(), StorageError> {
        put_keyed(
            &self.conn,
            KeyedTable::Settings,
            &setting.key,
            &setting.value,
            setting.timestamp,
        )
    }

    fn get_setting(&self, key: &str) -> Result<Option<Setting>, StorageError> {
        let row = get_keyed(&self.conn, KeyedTable::Settings, key)?;
        Ok(row.map(|(key, value, timestamp)| Setting { key, value, timestamp }))
    }

    fn get_settings(&self) -> Result<Vec<Setting>, StorageError> {
        let rows = list_keyed(&self.conn, KeyedTable::Settings)?;
        Ok(rows
            .into_iter()
            .map(|(key, value, timestamp)| Setting { key, value, timestamp })
            .collect())
    }

    fn delete_setting(&mut self, key: &str) -> Result<(), StorageError> {
        delete_keyed(&self.conn, KeyedTable::Settings, key)
    }

    fn clear_settings(&mut self) -> Result<(), StorageError> {
        clear_keyed(&self.conn, KeyedTable::Settings)
    }

    fn restore(&mut self, set: RestoreSet<'_>) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tasks", [])?;
        tx.execute("DELETE FROM categories", [])?;
        clear_keyed(&tx, KeyedTable::Integrations)?;
        if set.settings.is_some() {
            clear_keyed(&tx, KeyedTable::Settings)?;
        }

        for task in set.tasks {
            tx.execute(
                "INSERT INTO tasks (id, title, description, priority, category, completed, timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    task.id.as_i64(),
                    task.title,
                    task.description,
                    task.priority.as_str(),
                    task.category.map(|c| c.as_i64()),
                    task.completed,
                    task.timestamp,
                ],
            )?;
        }
        for category in set.categories {
            tx.execute(
                "INSERT INTO categories (id, name, description, color, count) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    category.id.as_i64(),
                    category.name,
                    category.description,
                    category.color.as_str(),
                    category.count,
                ],
            )?;
        }
        for integration in set.integrations {
            put_keyed(
                &tx,
                KeyedTable::Integrations,
                &integration.key,
                &integration.value,
                integration.timestamp,
            )?;
        }
        for setting in set.settings.unwrap_or_default() {
            put_keyed(&tx, KeyedTable::Settings, &setting.key, &setting.value, setting.timestamp)?;
        }

        tx.commit()?;
        Ok(())
    }
}
