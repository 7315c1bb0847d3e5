use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskdeck_core::{Category, CoreError, Integration, Setting, Task};
use taskdeck_storage::RestoreSet;

use crate::error::EngineError;
use crate::EntityStore;

pub const SNAPSHOT_VERSION: &str = "1.0";

const CSV_HEADER: &str = "id,title,description,priority,category,completed,timestamp";

/// Full backup of the user's data, as written to an export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub todos: Vec<Task>,
    pub categories: Vec<Category>,
    pub integrations: Vec<Integration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Vec<Setting>>,
    pub export_date: String,
    pub version: String,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self).map_err(CoreError::from)?)
    }
}

/// Record counts restored by an import. `settings` is `None` when the file had none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub todos: usize,
    pub categories: usize,
    pub integrations: usize,
    pub settings: Option<usize>,
}

/// What an import file may carry. Absent sections import as empty.
#[derive(Debug, Deserialize)]
struct ImportFile {
    #[serde(default)]
    todos: Option<Vec<Task>>,
    #[serde(default)]
    categories: Option<Vec<Category>>,
    #[serde(default)]
    integrations: Option<Vec<Integration>>,
    #[serde(default)]
    settings: Option<Vec<Setting>>,
}

impl EntityStore {
    /// Tasks, categories and integrations as they stand now. Settings are not exported.
    pub fn export_snapshot(&self) -> Result<Snapshot, EngineError> {
        Ok(Snapshot {
            todos: self.get_all_tasks()?,
            categories: self.get_all_categories()?,
            integrations: self.get_all_integrations()?,
            settings: None,
            export_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: SNAPSHOT_VERSION.to_string(),
        })
    }

    pub fn export_json(&self) -> Result<String, EngineError> {
        self.export_snapshot()?.to_json()
    }

    /// Tasks as CSV, one row per task, text fields quoted.
    pub fn export_tasks_csv(&self) -> Result<String, EngineError> {
        let tasks = self.get_all_tasks()?;
        let mut lines = Vec::with_capacity(tasks.len() + 1);
        lines.push(CSV_HEADER.to_string());
        for task in &tasks {
            lines.push(format!(
                "{},{},{},{},{},{},{}",
                task.id,
                csv_text(&task.title),
                csv_text(&task.description),
                task.priority.as_str(),
                task.category.map(|c| c.to_string()).unwrap_or_default(),
                task.completed,
                iso_timestamp(task.timestamp),
            ));
        }
        Ok(lines.join("\n"))
    }

    /// Replace the store's contents with an exported file.
    ///
    /// The file is validated in full before anything is touched. Tasks, categories and
    /// integrations are always cleared; settings only when the file carries a
    /// `settings` array. Records keep their exported ids.
    pub async fn import_json(&self, json: &str) -> Result<ImportSummary, EngineError> {
        let file = parse_import(json)?;
        let todos = file.todos.unwrap_or_default();
        let categories = file.categories.unwrap_or_default();
        let integrations = file.integrations.unwrap_or_default();
        validate_import(&todos, &categories, &integrations)?;

        let _tasks = self.lock_collection(crate::SyncCollection::Todos).await;
        let _categories = self.lock_collection(crate::SyncCollection::Categories).await;
        self.restore(RestoreSet {
            tasks: &todos,
            categories: &categories,
            integrations: &integrations,
            settings: file.settings.as_deref(),
        })?;

        let summary = ImportSummary {
            todos: todos.len(),
            categories: categories.len(),
            integrations: integrations.len(),
            settings: file.settings.as_ref().map(Vec::len),
        };
        tracing::info!(?summary, "import restored");
        Ok(summary)
    }
}

fn parse_import(json: &str) -> Result<ImportFile, EngineError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| EngineError::Validation(format!("not valid JSON: {e}")))?;
    let Value::Object(map) = &value else {
        return Err(EngineError::Validation("expected a JSON object".into()));
    };
    if !["todos", "categories", "integrations"]
        .iter()
        .any(|key| map.contains_key(*key))
    {
        return Err(EngineError::Validation(
            "file has no todos, categories or integrations".into(),
        ));
    }
    serde_json::from_value(value).map_err(|e| EngineError::Validation(e.to_string()))
}

fn validate_import(
    todos: &[Task],
    categories: &[Category],
    integrations: &[Integration],
) -> Result<(), EngineError> {
    let mut task_ids = HashSet::new();
    for task in todos {
        task.validate()
            .map_err(|e| EngineError::Validation(format!("task {}: {e}", task.id)))?;
        if !task_ids.insert(task.id) {
            return Err(EngineError::Validation(format!("duplicate task id {}", task.id)));
        }
    }
    let mut category_ids = HashSet::new();
    for category in categories {
        if !category_ids.insert(category.id) {
            return Err(EngineError::Validation(format!(
                "duplicate category id {}",
                category.id
            )));
        }
    }
    let mut keys = HashSet::new();
    for integration in integrations {
        if !keys.insert(integration.key.as_str()) {
            return Err(EngineError::Validation(format!(
                "duplicate integration key {:?}",
                integration.key
            )));
        }
    }
    Ok(())
}

fn csv_text(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn iso_timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_text_doubles_quotes() {
        assert_eq!(csv_text(r#"say "hi", twice"#), r#""say ""hi"", twice""#);
    }

    #[test]
    fn timestamps_render_as_utc_iso() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn import_needs_a_known_section() {
        assert!(matches!(
            parse_import(r#"{"version":"1.0"}"#),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(parse_import("[]"), Err(EngineError::Validation(_))));
        assert!(matches!(parse_import("{oops"), Err(EngineError::Validation(_))));
        let file = parse_import(r#"{"integrations":[]}"#).unwrap();
        assert!(file.todos.is_none());
        assert_eq!(file.integrations.map(|i| i.len()), Some(0));
    }

    #[test]
    fn duplicate_task_ids_are_rejected() {
        let file = parse_import(
            r#"{"todos":[
                {"id":1,"title":"a","timestamp":1},
                {"id":1,"title":"b","timestamp":2}
            ]}"#,
        )
        .unwrap();
        let todos = file.todos.unwrap();
        assert!(matches!(
            validate_import(&todos, &[], &[]),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_integration_keys_are_rejected() {
        let file = parse_import(
            r#"{"integrations":[
                {"key":"calendar","value":1,"timestamp":1},
                {"key":"calendar","value":2,"timestamp":2}
            ]}"#,
        )
        .unwrap();
        let integrations = file.integrations.unwrap();
        assert!(matches!(
            validate_import(&[], &[], &integrations),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn out_of_range_ids_fail_to_parse() {
        let err = parse_import(
            r#"{"todos":[{"id":9223372036854775808,"title":"a","timestamp":1}]}"#,
        );
        assert!(matches!(err, Err(EngineError::Validation(_))));
        let err = parse_import(
            r#"{"todos":[{"id":1,"title":"a","category":18446744073709551615,"timestamp":1}]}"#,
        );
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[test]
    fn snapshot_uses_camel_case_keys() {
        let snapshot = Snapshot {
            todos: vec![],
            categories: vec![],
            integrations: vec![],
            settings: None,
            export_date: "2024-01-01T00:00:00.000Z".into(),
            version: SNAPSHOT_VERSION.into(),
        };
        let json: Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["exportDate"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["version"], "1.0");
        assert!(json.get("settings").is_none());
    }
}
