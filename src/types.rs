use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const KIND_REGULAR: &str = "regular";
pub const KIND_PROJECT: &str = "project";

/// Task priority, ranked: lower rank sorts first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn rank(self) -> i64 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Decode a stored rank. Unknown ranks decode as `Medium`.
    pub fn from_rank(rank: i64) -> Self {
        match rank {
            0 => Priority::High,
            2 => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// Status filter over task views, orthogonal to the sort order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum StatusFilter {
    All,
    Pending,
    Completed,
}

impl StatusFilter {
    /// Resolve a filter name. Unknown names fall back to `All`.
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pending" => StatusFilter::Pending,
            "completed" => StatusFilter::Completed,
            "all" => StatusFilter::All,
            other => {
                tracing::warn!("unknown status filter '{other}'; falling back to all");
                StatusFilter::All
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Pending => "pending",
            StatusFilter::Completed => "completed",
        }
    }

    pub fn matches(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }
}

/// A task entity. `id == 0` means the task has not been persisted yet;
/// unsaved tasks never compare equal, not even to themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub category_id: Option<i64>,
    pub completed: bool,
    pub kind: String,
}

impl Task {
    pub fn is_saved(&self) -> bool {
        self.id != 0
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id != 0 && self.id == other.id
    }
}

/// A category entity. Same identifier rules as `Task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn is_saved(&self) -> bool {
        self.id != 0
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.id != 0 && self.id == other.id
    }
}

/// A task paired with its resolved category, if any. Never persisted;
/// recomputed per read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProjection {
    pub task: Task,
    pub category: Option<Category>,
}

/// Builder for a task about to be inserted.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) due_at: Option<DateTime<Utc>>,
    pub(crate) priority: Option<Priority>,
    pub(crate) category_id: Option<i64>,
    pub(crate) completed: bool,
    pub(crate) kind: String,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_at: None,
            priority: None,
            category_id: None,
            completed: false,
            kind: KIND_REGULAR.to_string(),
        }
    }

    /// A project draft carries the "Project: " title prefix.
    pub fn project(title: impl Into<String>) -> Self {
        let mut draft = Self::new(format!("Project: {}", title.into()));
        draft.kind = KIND_PROJECT.to_string();
        draft
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Materialize the draft as an unsaved task, applying defaults.
    pub(crate) fn into_task(self) -> Task {
        Task {
            id: 0,
            title: self.title,
            description: self.description,
            due_at: self.due_at,
            priority: self.priority.unwrap_or(Priority::Medium),
            category_id: self.category_id,
            completed: self.completed,
            kind: self.kind,
        }
    }
}

/// Builder for a category about to be inserted. When no color is given the
/// store assigns one from the palette.
#[derive(Debug, Clone)]
pub struct CategoryDraft {
    pub(crate) name: String,
    pub(crate) color: Option<String>,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}
