use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::new_task_id;

/// Domain failures surfaced to callers. Decode and persistence failures
/// never appear here: those are recovered internally by falling back to
/// defaults or keeping in-memory state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Title cannot be empty.")]
    EmptyTitle,

    #[error("Invalid priority.")]
    InvalidPriority,

    #[error("Task not found.")]
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Forgiving normalization used at the draft boundary: anything that is
    /// not a recognized priority becomes `Low`.
    pub fn lenient(value: &str) -> Priority {
        value.parse().unwrap_or(Priority::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(TaskError::InvalidPriority),
        }
    }
}

/// One task record. `title` is never empty or whitespace-only once stored,
/// `notes` is absent rather than empty, and `updated_at` is refreshed on
/// every mutation (so it never precedes `created_at`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub done: bool,

    pub priority: Priority,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh record from already-validated fields. Creation and
    /// update timestamps start out equal.
    pub fn new(title: String, notes: Option<String>, priority: Priority, now: DateTime<Utc>) -> Self {
        Self {
            id: new_task_id(),
            title,
            notes,
            done: false,
            priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller-supplied input for `add_task`; validated and normalized there.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
}

/// Partial update for `update_task`. `None` means "leave the field alone";
/// `notes: Some("")` collapses to absent after trimming.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
}
