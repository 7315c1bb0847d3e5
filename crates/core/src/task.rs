use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, TaskId};
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    Highest,
    High,
    #[default]
    Medium,
    Low,
    #[serde(rename = "Very Low", alias = "VeryLow")]
    VeryLow,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Self::Highest,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::VeryLow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "Highest",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::VeryLow => "Very Low",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "Highest" => Ok(Self::Highest),
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            "Very Low" | "VeryLow" => Ok(Self::VeryLow),
            _ => Err(CoreError::InvalidData(format!("unknown priority: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub completed: bool,
    pub timestamp: i64,
}

impl Task {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.id.check()?;
        validate_fields(&self.title, self.category)
    }
}

/// A task that has not been persisted yet. It carries no id: the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub completed: bool,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            category: None,
            completed: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_fields(&self.title, self.category)
    }

    pub fn into_task(self, id: TaskId, timestamp: i64) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            category: self.category,
            completed: self.completed,
            timestamp,
        }
    }
}

impl From<Task> for NewTask {
    fn from(task: Task) -> Self {
        Self {
            title: task.title,
            description: task.description,
            priority: task.priority,
            category: task.category,
            completed: task.completed,
        }
    }
}

fn validate_fields(title: &str, category: Option<CategoryId>) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::InvalidData("task title must not be empty".into()));
    }
    if let Some(category) = category {
        category.check()?;
    }
    Ok(())
}

/// A task row as it sits on disk. Rows written before the priority column existed
/// carry `priority: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTask {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub category: Option<CategoryId>,
    pub completed: bool,
    pub timestamp: i64,
}

/// Bring a stored row up to the current record shape.
///
/// Returns the task and whether anything differed from what is on disk. A missing or
/// unreadable priority becomes `Medium`; an accepted alias is rewritten to its
/// canonical token. Callers persist the task when `changed` is true.
pub fn normalize_task(stored: StoredTask) -> (Task, bool) {
    let (priority, changed) = match stored.priority.as_deref() {
        None => (Priority::Medium, true),
        Some(raw) => match Priority::parse(raw) {
            Ok(p) => (p, p.as_str() != raw),
            Err(_) => (Priority::Medium, true),
        },
    };
    let task = Task {
        id: stored.id,
        title: stored.title,
        description: stored.description,
        priority,
        category: stored.category,
        completed: stored.completed,
        timestamp: stored.timestamp,
    };
    (task, changed)
}
