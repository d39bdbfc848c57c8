use anyhow::anyhow;

use crate::task::{Priority, Task};

/// Done-status slice of the collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.done,
            StatusFilter::Completed => task.done,
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(anyhow!(
                "invalid status filter: {other} (expected all, active or completed)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    #[default]
    All,
    Only(Priority),
}

impl PriorityFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Only(priority) => task.priority == *priority,
        }
    }
}

impl std::str::FromStr for PriorityFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(PriorityFilter::All);
        }
        let priority = trimmed
            .parse::<Priority>()
            .map_err(|_| anyhow!("invalid priority filter: {trimmed} (expected all, low, medium or high)"))?;
        Ok(PriorityFilter::Only(priority))
    }
}

/// Case-insensitive substring match over title and notes. `needle` must
/// already be trimmed and lowercased; the empty needle matches everything.
pub fn matches_search(task: &Task, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    if task.title.to_lowercase().contains(needle) {
        return true;
    }

    task.notes
        .as_deref()
        .is_some_and(|notes| notes.to_lowercase().contains(needle))
}
