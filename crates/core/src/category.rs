use serde::{Deserialize, Serialize};

use crate::ids::CategoryId;
use crate::CoreError;

/// Display palette for categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
    Warning,
    Info,
    Light,
    Dark,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Success => "success",
            Self::Danger => "danger",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "success" => Ok(Self::Success),
            "danger" => Ok(Self::Danger),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(CoreError::InvalidData(format!("unknown color: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Color,
    /// Advisory only. Recomputed from the task collection when loaded for display.
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub count: i64,
}

impl NewCategory {
    pub fn new(name: impl Into<String>, description: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            color,
            count: 0,
        }
    }

    pub fn into_category(self, id: CategoryId) -> Category {
        Category {
            id,
            name: self.name,
            description: self.description,
            color: self.color,
            count: self.count,
        }
    }
}

impl From<Category> for NewCategory {
    fn from(category: Category) -> Self {
        Self {
            name: category.name,
            description: category.description,
            color: category.color,
            count: category.count,
        }
    }
}

/// The set seeded into an empty categories collection. Same every time.
pub fn default_categories() -> Vec<NewCategory> {
    vec![
        NewCategory::new("Work", "Tasks related to your professional work", Color::Primary),
        NewCategory::new("Personal", "Personal tasks and errands", Color::Success),
        NewCategory::new("Shopping", "Shopping lists and purchases", Color::Warning),
        NewCategory::new("Health", "Health and fitness related tasks", Color::Info),
    ]
}
