//! Schema declaration and additive upgrades.
//!
//! Every upgrade is expressed as "ensure this exists": tables, columns and indexes are
//! created only when missing, so a store at any older version reaches the current
//! shape in one pass and re-running the pass is a no-op. Records are never dropped
//! or rewritten here; rows that predate a column are fixed up lazily on read.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 2;

/// Result of bringing a connection up to [`SCHEMA_VERSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaUpgrade {
    pub from: i32,
    pub to: i32,
}

impl SchemaUpgrade {
    pub fn is_upgrade(&self) -> bool {
        self.from < self.to
    }
}

pub fn init_schema(conn: &Connection) -> Result<SchemaUpgrade, StorageError> {
    // Set first: every later lock wait depends on it.
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") && !mode.eq_ignore_ascii_case("memory") {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

    if let Some(version) = current_version(conn)? {
        warn_if_newer(version);
        return Ok(SchemaUpgrade {
            from: version,
            to: version,
        });
    }

    // Write lock up front; a deferred read lock cannot wait its way into a write.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute_batch(VERSION_TABLE_SQL)?;
    let from = stored_version(&tx)?;
    warn_if_newer(from);
    tx.execute_batch(TABLES_SQL)?;
    for (column, decl) in TASK_COLUMNS_ADDED_V2 {
        if !has_column(&tx, "tasks", column)? {
            tx.execute_batch(&format!("ALTER TABLE tasks ADD COLUMN {column} {decl};"))?;
        }
    }
    tx.execute_batch(INDEXES_SQL)?;
    tx.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        rusqlite::params![SCHEMA_VERSION],
    )?;
    tx.commit()?;

    let upgrade = SchemaUpgrade {
        from,
        to: from.max(SCHEMA_VERSION),
    };
    if upgrade.is_upgrade() {
        tracing::info!(from = upgrade.from, to = upgrade.to, "schema upgraded");
    }
    Ok(upgrade)
}

/// The stored version when the store is already at least current and every table,
/// column and index exists. `None` means the upgrade pass has work to do.
fn current_version(conn: &Connection) -> Result<Option<i32>, StorageError> {
    let objects = schema_objects(conn)?;
    let has = |kind: &str, name: &str| objects.iter().any(|(k, n)| k == kind && n == name);
    if !has("table", "schema_version") {
        return Ok(None);
    }
    let version = stored_version(conn)?;
    if version < SCHEMA_VERSION
        || !REQUIRED_TABLES.iter().all(|t| has("table", t))
        || !REQUIRED_INDEXES.iter().all(|i| has("index", i))
    {
        return Ok(None);
    }
    for (column, _) in TASK_COLUMNS_ADDED_V2 {
        if !has_column(conn, "tasks", column)? {
            return Ok(None);
        }
    }
    Ok(Some(version))
}

fn warn_if_newer(version: i32) {
    if version > SCHEMA_VERSION {
        tracing::warn!(
            stored = version,
            known = SCHEMA_VERSION,
            "store was written by a newer schema; opening without downgrade"
        );
    }
}

/// Highest version recorded in the store, 0 for a fresh file.
pub fn stored_version(conn: &Connection) -> Result<i32, StorageError> {
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// `(type, name)` of every table and index, for schema comparisons.
pub fn schema_objects(conn: &Connection) -> Result<Vec<(String, String)>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT type, name FROM sqlite_master
         WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'
         ORDER BY type, name",
    )?;
    let objects = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(objects)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StorageError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|n| n == column))
}

// Columns tasks gained in version 2. Fresh stores get them from TABLES_SQL.
const TASK_COLUMNS_ADDED_V2: [(&str, &str); 2] = [("priority", "TEXT"), ("category", "INTEGER")];

const REQUIRED_TABLES: [&str; 4] = ["tasks", "categories", "integrations", "settings"];

const REQUIRED_INDEXES: [&str; 6] = [
    "idx_tasks_completed",
    "idx_tasks_timestamp",
    "idx_tasks_priority",
    "idx_tasks_category",
    "idx_categories_name",
    "idx_categories_color",
];

const VERSION_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
";

const TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    completed INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL,
    priority TEXT,
    category INTEGER
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    color TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS integrations (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    timestamp INTEGER NOT NULL
);
";

const INDEXES_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_tasks_completed ON tasks (completed);
CREATE INDEX IF NOT EXISTS idx_tasks_timestamp ON tasks (timestamp);
CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks (priority);
CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks (category);
CREATE INDEX IF NOT EXISTS idx_categories_name ON categories (name);
CREATE INDEX IF NOT EXISTS idx_categories_color ON categories (color);
";
