use tracing::{debug, instrument};

use crate::cell::SyncedCell;
use crate::clock::Clock;
use crate::filter::{PriorityFilter, StatusFilter, matches_search};
use crate::schema;
use crate::store::StoreContext;
use crate::task::{Priority, Task, TaskDraft, TaskError, TaskPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

/// The task collection, synchronized with the `nlstore:tasks` entry, plus
/// ephemeral view state (status/priority filters and a search string) that
/// is recomputed per query and never persisted.
pub struct TaskStore {
    cell: SyncedCell<Vec<Task>>,
    clock: Clock,
    filter: StatusFilter,
    priority_filter: PriorityFilter,
    search: String,
}

impl TaskStore {
    #[instrument(skip(ctx))]
    pub fn open(ctx: &StoreContext) -> Self {
        schema::ensure_schema_version(ctx);
        Self {
            cell: SyncedCell::new(ctx, schema::keys::TASKS, Vec::new()),
            clock: Clock::new(),
            filter: StatusFilter::default(),
            priority_filter: PriorityFilter::default(),
            search: String::new(),
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.cell.get()
    }

    /// Validate, normalize and append a new task. The collection is not
    /// touched when validation fails.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add_task(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }

        let notes = draft
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(str::to_string);
        let priority = draft.priority.unwrap_or_default();

        let task = Task::new(title.to_string(), notes, priority, self.clock.now());
        debug!(id = %task.id, "adding task");

        let appended = task.clone();
        self.cell.update(move |tasks| {
            let mut next = tasks.clone();
            next.push(appended);
            next
        });
        Ok(task)
    }

    /// Flip the done flag of the matching task. Unknown ids are silently
    /// ignored; toggling is idempotent-style, not an error.
    #[instrument(skip(self))]
    pub fn toggle_done(&mut self, id: &str) {
        let now = self.clock.now();
        self.cell.update(|tasks| {
            tasks
                .iter()
                .map(|task| {
                    if task.id != id {
                        return task.clone();
                    }
                    let mut task = task.clone();
                    task.done = !task.done;
                    task.updated_at = now;
                    task
                })
                .collect()
        });
    }

    /// Apply a partial update to the matching task. Unlike toggle/delete,
    /// a missing id is reported here.
    #[instrument(skip(self, patch))]
    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<(), TaskError> {
        let title = match patch.title.as_deref() {
            Some(title) => {
                let title = title.trim();
                if title.is_empty() {
                    return Err(TaskError::EmptyTitle);
                }
                Some(title.to_string())
            }
            None => None,
        };

        let now = self.clock.now();
        let mut found = false;
        let next: Vec<Task> = self.cell.with(|tasks| {
            tasks
                .iter()
                .map(|task| {
                    if task.id != id {
                        return task.clone();
                    }
                    found = true;

                    let mut task = task.clone();
                    if let Some(title) = &title {
                        task.title = title.clone();
                    }
                    if let Some(notes) = patch.notes.as_deref() {
                        let notes = notes.trim();
                        task.notes = if notes.is_empty() {
                            None
                        } else {
                            Some(notes.to_string())
                        };
                    }
                    if let Some(priority) = patch.priority {
                        task.priority = priority;
                    }
                    task.updated_at = now;
                    task
                })
                .collect()
        });

        if !found {
            return Err(TaskError::NotFound);
        }

        self.cell.set(next);
        Ok(())
    }

    /// Remove the matching task; unknown ids are silently ignored.
    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: &str) {
        self.cell
            .update(|tasks| tasks.iter().filter(|task| task.id != id).cloned().collect());
    }

    #[instrument(skip(self))]
    pub fn clear_completed(&mut self) {
        self.cell
            .update(|tasks| tasks.iter().filter(|task| !task.done).cloned().collect());
    }

    /// Wholesale replacement of the collection (import/restore flows).
    #[instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.cell.set(tasks);
    }

    /// Drop the persisted collection and reset in-memory state to empty.
    #[instrument(skip(self))]
    pub fn clear_tasks(&mut self) {
        self.cell.clear();
    }

    pub fn set_filter(&mut self, filter: StatusFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn set_priority_filter(&mut self, filter: PriorityFilter) {
        self.priority_filter = filter;
    }

    pub fn priority_filter(&self) -> PriorityFilter {
        self.priority_filter
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn stats(&self) -> Stats {
        self.cell.with(|tasks| {
            let total = tasks.len();
            let completed = tasks.iter().filter(|task| task.done).count();
            Stats {
                total,
                active: total - completed,
                completed,
            }
        })
    }

    /// The collection narrowed by status filter, then priority filter, then
    /// search. Derived on every call, never persisted.
    pub fn filtered_tasks(&self) -> Vec<Task> {
        let needle = self.search.trim().to_lowercase();
        self.cell.with(|tasks| {
            tasks
                .iter()
                .filter(|task| {
                    self.filter.matches(task)
                        && self.priority_filter.matches(task)
                        && matches_search(task, &needle)
                })
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TaskStore;
    use crate::filter::{PriorityFilter, StatusFilter};
    use crate::store::Store;
    use crate::task::{Priority, TaskDraft, TaskError, TaskPatch};

    fn open_store() -> (Store, TaskStore) {
        let store = Store::in_memory();
        let tasks = TaskStore::open(&store.context());
        (store, tasks)
    }

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            ..TaskDraft::default()
        }
    }

    #[test]
    fn add_appends_one_task_with_a_unique_id() {
        let (_store, mut tasks) = open_store();

        let first = tasks.add_task(draft("Buy milk")).expect("add");
        let second = tasks.add_task(draft("Walk dog")).expect("add");

        let all = tasks.tasks();
        assert_eq!(all.len(), 2);
        assert_ne!(first.id, second.id);
        assert_eq!(all[0].title, "Buy milk");
        assert_eq!(all[1].title, "Walk dog");
        assert_eq!(first.created_at, first.updated_at);
    }

    #[test]
    fn add_trims_title_and_collapses_empty_notes() {
        let (_store, mut tasks) = open_store();

        let task = tasks
            .add_task(TaskDraft {
                title: "  Buy milk  ".to_string(),
                notes: Some("   ".to_string()),
                priority: None,
            })
            .expect("add");

        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.notes, None);
        assert_eq!(task.priority, Priority::Low);
    }

    #[test]
    fn add_rejects_whitespace_only_titles_without_mutating() {
        let (_store, mut tasks) = open_store();

        let err = tasks.add_task(draft("   ")).expect_err("must fail");
        assert_eq!(err, TaskError::EmptyTitle);
        assert_eq!(err.to_string(), "Title cannot be empty.");
        assert!(tasks.tasks().is_empty());
    }

    #[test]
    fn toggle_twice_restores_done_and_advances_updated_at() {
        let (_store, mut tasks) = open_store();
        let task = tasks.add_task(draft("Buy milk")).expect("add");

        tasks.toggle_done(&task.id);
        let after_first = tasks.tasks()[0].clone();
        assert!(after_first.done);
        assert!(after_first.updated_at > task.updated_at);

        tasks.toggle_done(&task.id);
        let after_second = tasks.tasks()[0].clone();
        assert!(!after_second.done);
        assert!(after_second.updated_at > after_first.updated_at);
    }

    #[test]
    fn toggle_of_an_unknown_id_is_a_silent_no_op() {
        let (_store, mut tasks) = open_store();
        tasks.add_task(draft("Buy milk")).expect("add");

        tasks.toggle_done("no-such-id");
        assert!(!tasks.tasks()[0].done);
    }

    #[test]
    fn update_applies_only_the_supplied_fields() {
        let (_store, mut tasks) = open_store();
        let task = tasks
            .add_task(TaskDraft {
                title: "Buy milk".to_string(),
                notes: Some("two liters".to_string()),
                priority: Some(Priority::Medium),
            })
            .expect("add");

        tasks
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("  Buy oat milk  ".to_string()),
                    ..TaskPatch::default()
                },
            )
            .expect("update");

        let updated = tasks.tasks()[0].clone();
        assert_eq!(updated.title, "Buy oat milk");
        assert_eq!(updated.notes.as_deref(), Some("two liters"));
        assert_eq!(updated.priority, Priority::Medium);
        assert!(updated.updated_at > task.updated_at);
    }

    #[test]
    fn update_collapses_empty_notes_to_absent() {
        let (_store, mut tasks) = open_store();
        let task = tasks
            .add_task(TaskDraft {
                title: "Buy milk".to_string(),
                notes: Some("two liters".to_string()),
                priority: None,
            })
            .expect("add");

        tasks
            .update_task(
                &task.id,
                TaskPatch {
                    notes: Some("  ".to_string()),
                    ..TaskPatch::default()
                },
            )
            .expect("update");

        assert_eq!(tasks.tasks()[0].notes, None);
    }

    #[test]
    fn update_validates_before_looking_up_the_task() {
        let (_store, mut tasks) = open_store();
        let task = tasks.add_task(draft("Buy milk")).expect("add");

        let err = tasks
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("   ".to_string()),
                    ..TaskPatch::default()
                },
            )
            .expect_err("must fail");
        assert_eq!(err, TaskError::EmptyTitle);
        assert_eq!(tasks.tasks()[0].title, "Buy milk");
    }

    #[test]
    fn update_of_an_unknown_id_reports_not_found() {
        let (_store, mut tasks) = open_store();
        tasks.add_task(draft("Buy milk")).expect("add");

        let err = tasks
            .update_task("no-such-id", TaskPatch::default())
            .expect_err("must fail");
        assert_eq!(err, TaskError::NotFound);
        assert_eq!(err.to_string(), "Task not found.");
    }

    #[test]
    fn delete_of_an_unknown_id_is_a_silent_no_op() {
        let (_store, mut tasks) = open_store();
        tasks.add_task(draft("Buy milk")).expect("add");

        tasks.delete_task("no-such-id");
        assert_eq!(tasks.tasks().len(), 1);
    }

    #[test]
    fn clear_completed_is_idempotent() {
        let (_store, mut tasks) = open_store();
        let keep = tasks.add_task(draft("Keep me")).expect("add");
        let done = tasks.add_task(draft("Finish me")).expect("add");
        tasks.toggle_done(&done.id);

        tasks.clear_completed();
        let once = tasks.tasks();
        assert_eq!(once.len(), 1);
        assert_eq!(once[0].id, keep.id);

        tasks.clear_completed();
        assert_eq!(tasks.tasks(), once);
    }

    #[test]
    fn replace_all_swaps_the_whole_collection() {
        let (_store, mut tasks) = open_store();
        tasks.add_task(draft("Old")).expect("add");

        let replacement = vec![
            crate::task::Task::new("New".to_string(), None, Priority::High, chrono::Utc::now()),
        ];
        tasks.replace_all(replacement.clone());
        assert_eq!(tasks.tasks(), replacement);
    }

    #[test]
    fn clear_tasks_resets_memory_and_storage() {
        let (store, mut tasks) = open_store();
        tasks.add_task(draft("Buy milk")).expect("add");

        tasks.clear_tasks();
        assert!(tasks.tasks().is_empty());
        assert_eq!(store.context().get_raw(crate::schema::keys::TASKS), None);
    }

    #[test]
    fn stats_count_total_active_and_completed() {
        let (_store, mut tasks) = open_store();
        tasks.add_task(draft("a")).expect("add");
        let done = tasks.add_task(draft("b")).expect("add");
        tasks.toggle_done(&done.id);

        let stats = tasks.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn filtered_tasks_apply_status_priority_and_search_in_turn() {
        let (_store, mut tasks) = open_store();
        tasks
            .add_task(TaskDraft {
                title: "Write report".to_string(),
                notes: Some("quarterly numbers".to_string()),
                priority: Some(Priority::High),
            })
            .expect("add");
        let done = tasks
            .add_task(TaskDraft {
                title: "Send report".to_string(),
                notes: None,
                priority: Some(Priority::High),
            })
            .expect("add");
        tasks
            .add_task(TaskDraft {
                title: "Water plants".to_string(),
                notes: None,
                priority: Some(Priority::Low),
            })
            .expect("add");
        tasks.toggle_done(&done.id);

        tasks.set_filter(StatusFilter::Active);
        tasks.set_priority_filter(PriorityFilter::Only(Priority::High));
        tasks.set_search("  REPORT ");

        let filtered = tasks.filtered_tasks();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "Write report");

        // search over notes too
        tasks.set_search("quarterly");
        assert_eq!(tasks.filtered_tasks().len(), 1);

        // the filtered view never outgrows the base collection
        tasks.set_filter(StatusFilter::All);
        tasks.set_priority_filter(PriorityFilter::All);
        tasks.set_search("");
        assert_eq!(tasks.filtered_tasks().len(), tasks.tasks().len());
    }
}
