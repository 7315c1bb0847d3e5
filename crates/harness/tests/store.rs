use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;
use taskdeck_core::{CategoryId, Color, NewCategory, NewTask, Priority, TaskId};
use taskdeck_engine::EngineError;
use taskdeck_harness::{init_tracing, TestDevice};
use taskdeck_storage::{SqliteStorage, SCHEMA_VERSION};

/// A store as the first release left it: tasks without priority or category.
fn legacy_v1_database(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch(
        "
        CREATE TABLE schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );
        INSERT INTO schema_version (version, applied_at) VALUES (1, 0);
        CREATE TABLE tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL
        );
        INSERT INTO tasks (title, description, completed, timestamp)
            VALUES ('Renew passport', 'before june', 0, 1700000000000);
        INSERT INTO tasks (title, description, completed, timestamp)
            VALUES ('Call plumber', '', 1, 1700000001000);
        ",
    )?;
    Ok(())
}

fn raw_priorities(path: &Path) -> Result<Vec<Option<String>>, Box<dyn std::error::Error>> {
    let conn = rusqlite::Connection::open(path)?;
    let mut stmt = conn.prepare("SELECT priority FROM tasks ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, Option<String>>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// Tasks
// ============================================================================

#[tokio::test]
async fn added_tasks_read_back_with_a_priority() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let device = TestDevice::new()?;

    let plain = device.store.add_task(NewTask::new("Buy milk")).await?;
    let rich = device
        .store
        .add_task(
            NewTask::new("Draft report")
                .with_description("<p>Q3 numbers</p>")
                .with_priority(Priority::Highest)
                .completed(true),
        )
        .await?;

    let tasks = device.store.get_all_tasks()?;
    assert_eq!(tasks.len(), 2);

    let milk = tasks.iter().find(|t| t.id == plain).unwrap();
    assert_eq!(milk.title, "Buy milk");
    assert_eq!(milk.description, "");
    assert!(!milk.completed);
    assert_eq!(milk.priority, Priority::Medium);
    assert!(milk.timestamp > 0);

    let report = tasks.iter().find(|t| t.id == rich).unwrap();
    assert_eq!(report.description, "<p>Q3 numbers</p>");
    assert_eq!(report.priority, Priority::Highest);
    assert!(report.completed);
    Ok(())
}

#[tokio::test]
async fn blank_titles_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let err = device.store.add_task(NewTask::new("  ")).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));
    assert!(device.store.get_all_tasks()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unstorable_category_id_is_rejected_before_writing()
-> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let huge = CategoryId::from_raw(u64::MAX);

    let err = device
        .store
        .add_task(NewTask::new("x").in_category(huge))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));

    let id = device.store.add_task(NewTask::new("y")).await?;
    let mut task = device.store.get_task(id)?.unwrap();
    task.category = Some(huge);
    assert!(device.store.update_task(&task).await.is_err());

    let tasks = device.store.get_all_tasks()?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].category, None);
    Ok(())
}

#[tokio::test]
async fn update_replaces_fields_but_keeps_timestamp() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let id = device.store.add_task(NewTask::new("Stretch")).await?;
    let mut task = device.store.get_task(id)?.unwrap();
    let created = task.timestamp;

    task.title = "Stretch for 10 minutes".into();
    task.priority = Priority::Low;
    task.category = Some(CategoryId::from_raw(2));
    task.timestamp = 1;
    device.store.update_task(&task).await?;

    let stored = device.store.get_task(id)?.unwrap();
    assert_eq!(stored.title, "Stretch for 10 minutes");
    assert_eq!(stored.priority, Priority::Low);
    assert_eq!(stored.category, Some(CategoryId::from_raw(2)));
    assert_eq!(stored.timestamp, created);
    Ok(())
}

#[tokio::test]
async fn updating_missing_task_is_not_found_deleting_is_noop()
-> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let id = device.store.add_task(NewTask::new("Ghost")).await?;
    let mut task = device.store.get_task(id)?.unwrap();
    device.store.delete_task(id).await?;

    task.title = "Still a ghost".into();
    let err = device.store.update_task(&task).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    device.store.delete_task(id).await?;
    device.store.delete_task(TaskId::from_raw(999)).await?;
    assert!(device.store.get_all_tasks()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn toggle_flips_completion() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let id = device.store.add_task(NewTask::new("Water plants")).await?;

    let toggled = device.store.toggle_task(id).await?.unwrap();
    assert!(toggled.completed);
    assert_eq!(device.store.get_tasks_by_status(true)?.len(), 1);
    assert!(device.store.get_tasks_by_status(false)?.is_empty());

    let toggled = device.store.toggle_task(id).await?.unwrap();
    assert!(!toggled.completed);
    assert!(device.store.toggle_task(TaskId::from_raw(77)).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn ids_are_not_reused_after_delete_or_clear() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let first = device.store.add_task(NewTask::new("one")).await?;
    let second = device.store.add_task(NewTask::new("two")).await?;
    device.store.clear_tasks().await?;

    let third = device.store.add_task(NewTask::new("three")).await?;
    assert!(third > second && second > first);
    Ok(())
}

#[tokio::test]
async fn data_survives_restart() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new()?;
    device.store.add_task(NewTask::new("Persist me")).await?;
    device.store.put_setting("theme", json!("dark"))?;

    device.reopen()?;
    let tasks = device.store.get_all_tasks()?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Persist me");
    assert_eq!(device.store.get_setting("theme")?.unwrap().value, json!("dark"));
    Ok(())
}

// ============================================================================
// Schema and lazy migration
// ============================================================================

#[test]
fn opening_twice_gives_the_same_schema() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let first = SqliteStorage::open(device.db_path())?;
    let objects = first.schema_objects()?;
    drop(first);

    let second = SqliteStorage::open(device.db_path())?;
    assert_eq!(second.schema_objects()?, objects);
    assert!(!second.schema_upgrade().is_upgrade());
    assert_eq!(device.store.schema_version()?, SCHEMA_VERSION);
    Ok(())
}

#[test]
fn concurrent_opens_of_a_legacy_store_all_succeed() -> Result<(), Box<dyn std::error::Error>> {
    const OPENERS: usize = 4;
    for _ in 0..25 {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("taskdeck.db");
        legacy_v1_database(&path)?;

        let barrier = Arc::new(Barrier::new(OPENERS));
        let handles: Vec<_> = (0..OPENERS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                thread::spawn(move || {
                    barrier.wait();
                    SqliteStorage::open(&path).map(|_| ()).map_err(|e| e.to_string())
                })
            })
            .collect();
        for handle in handles {
            let opened = handle.join().map_err(|_| "open thread panicked")?;
            assert_eq!(opened, Ok(()));
        }

        let storage = SqliteStorage::open(&path)?;
        assert!(!storage.schema_upgrade().is_upgrade());
        assert_eq!(storage.schema_upgrade().to, SCHEMA_VERSION);
    }
    Ok(())
}

#[test]
fn legacy_store_is_upgraded_without_losing_records() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let device = TestDevice::with_database(legacy_v1_database)?;
    assert_eq!(device.store.schema_version()?, SCHEMA_VERSION);

    // Upgrade adds the column but leaves existing rows alone.
    assert_eq!(raw_priorities(device.db_path())?, vec![None, None]);

    let tasks = device.store.get_all_tasks()?;
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].title, "Renew passport");
    assert_eq!(tasks[0].description, "before june");
    assert!(tasks[1].completed);
    assert!(tasks.iter().all(|t| t.priority == Priority::Medium));
    assert!(tasks.iter().all(|t| t.category.is_none()));
    Ok(())
}

#[test]
fn lazy_migration_writes_back_once() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::with_database(legacy_v1_database)?;

    let first = device.store.get_all_tasks()?;
    let medium = Some("Medium".to_string());
    assert_eq!(raw_priorities(device.db_path())?, vec![medium.clone(), medium.clone()]);

    let second = device.store.get_all_tasks()?;
    assert_eq!(first, second);
    assert_eq!(raw_priorities(device.db_path())?, vec![medium.clone(), medium]);
    Ok(())
}

#[tokio::test]
async fn migration_does_not_clobber_a_newer_edit() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::with_database(legacy_v1_database)?;

    // Single-record reads normalize in memory only.
    let mut task = device.store.get_task(TaskId::from_raw(1))?.unwrap();
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(raw_priorities(device.db_path())?[0], None);

    task.priority = Priority::High;
    device.store.update_task(&task).await?;

    let tasks = device.store.get_all_tasks()?;
    assert_eq!(tasks[0].priority, Priority::High);
    assert_eq!(
        raw_priorities(device.db_path())?,
        vec![Some("High".to_string()), Some("Medium".to_string())]
    );
    Ok(())
}

// ============================================================================
// Categories
// ============================================================================

#[test]
fn categories_are_seeded_once() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;

    let first = device.store.get_all_categories()?;
    let names: Vec<&str> = first.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Work", "Personal", "Shopping", "Health"]);

    let second = device.store.get_all_categories()?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn cleared_categories_reseed_on_next_read() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let seeded = device.store.get_all_categories()?;
    device.store.clear_categories().await?;

    let reseeded = device.store.get_all_categories()?;
    assert_eq!(reseeded.len(), 4);
    assert!(reseeded[0].id > seeded[3].id);
    Ok(())
}

#[tokio::test]
async fn added_category_suppresses_seeding() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let id = device
        .store
        .add_category(NewCategory::new("Garden", "Outdoor chores", Color::Success))
        .await?;

    let categories = device.store.get_all_categories()?;
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].id, id);
    assert_eq!(categories[0].color, Color::Success);
    Ok(())
}

#[tokio::test]
async fn counts_are_recomputed_from_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let categories = device.store.get_all_categories()?;
    let work = categories[0].id;
    let health = categories[3].id;

    device.store.add_task(NewTask::new("Standup").in_category(work)).await?;
    device.store.add_task(NewTask::new("Review PR").in_category(work)).await?;
    device.store.add_task(NewTask::new("Run").in_category(health)).await?;
    device.store.add_task(NewTask::new("Loose end")).await?;

    let with_counts = device.store.get_categories_with_counts()?;
    let counts: Vec<(&str, i64)> = with_counts.iter().map(|c| (c.name.as_str(), c.count)).collect();
    assert_eq!(counts, [("Work", 2), ("Personal", 0), ("Shopping", 0), ("Health", 1)]);
    Ok(())
}

#[tokio::test]
async fn deleting_a_category_leaves_tasks_dangling() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let shopping = device.store.get_all_categories()?[2].id;
    let id = device.store.add_task(NewTask::new("Eggs").in_category(shopping)).await?;

    device.store.delete_category(shopping).await?;
    assert!(device.store.get_category(shopping)?.is_none());
    assert_eq!(device.store.get_task(id)?.unwrap().category, Some(shopping));
    Ok(())
}

#[tokio::test]
async fn category_update_is_full_record() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    let mut personal = device.store.get_all_categories()?[1].clone();
    personal.name = "Home".into();
    personal.color = Color::Dark;
    device.store.update_category(&personal).await?;

    assert_eq!(device.store.get_category(personal.id)?.unwrap(), personal);
    Ok(())
}

// ============================================================================
// Integrations and settings
// ============================================================================

#[test]
fn keyed_collections_upsert() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    device.store.put_integration("calendar", json!({"token": "abc", "scopes": ["read"]}))?;
    device.store.put_integration("calendar", json!({"token": "def"}))?;
    device.store.put_integration("mail", json!(null))?;

    let all = device.store.get_all_integrations()?;
    assert_eq!(all.len(), 2);
    let calendar = device.store.get_integration("calendar")?.unwrap();
    assert_eq!(calendar.value, json!({"token": "def"}));

    device.store.delete_integration("mail")?;
    assert!(device.store.get_integration("mail")?.is_none());
    device.store.clear_integrations()?;
    assert!(device.store.get_all_integrations()?.is_empty());

    device.store.put_setting("apiUrl", json!("http://localhost:3001"))?;
    assert_eq!(
        device.store.api_url_setting()?.as_deref(),
        Some("http://localhost:3001")
    );
    device.store.put_setting("apiUrl", json!(""))?;
    assert_eq!(device.store.api_url_setting()?, None);
    device.store.clear_settings()?;
    assert!(device.store.get_all_settings()?.is_empty());
    Ok(())
}

// ============================================================================
// Pending-change flag
// ============================================================================

#[tokio::test]
async fn offline_mutations_raise_pending_flag() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    assert!(!device.state.is_online());

    // Reads, including seeding and migration, are not local changes.
    device.store.get_all_categories()?;
    device.store.get_all_tasks()?;
    assert!(!device.state.has_pending_changes());

    device.store.add_task(NewTask::new("Offline note")).await?;
    assert!(device.state.has_pending_changes());
    Ok(())
}

#[tokio::test]
async fn online_mutations_leave_flag_clear() -> Result<(), Box<dyn std::error::Error>> {
    let device = TestDevice::new()?;
    device.go_online();

    let id = device.store.add_task(NewTask::new("Online note")).await?;
    device.store.toggle_task(id).await?;
    device.store.put_setting("theme", json!("light"))?;
    assert!(!device.state.has_pending_changes());

    device.go_offline();
    device.store.put_setting("theme", json!("dark"))?;
    assert!(device.state.has_pending_changes());
    Ok(())
}
