use std::io::Read;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument};

use crate::cell::SyncedCell;
use crate::cli::Command;
use crate::render;
use crate::schema;
use crate::store::Store;
use crate::task::{Priority, Task, TaskDraft, TaskPatch};
use crate::tasks::TaskStore;

#[instrument(skip(store, command))]
pub fn dispatch(store: &Store, command: Command) -> anyhow::Result<()> {
    let ctx = store.context();
    debug!(command = ?command, "dispatching command");

    match command {
        Command::Add {
            title,
            notes,
            priority,
        } => {
            let mut tasks = TaskStore::open(&ctx);
            let draft = TaskDraft {
                title: title.join(" "),
                notes,
                priority: priority.as_deref().map(Priority::lenient),
            };
            let task = tasks.add_task(draft)?;
            println!("Created task {}.", short_id(&task.id));
            Ok(())
        }

        Command::List {
            status,
            priority,
            search,
        } => {
            let mut tasks = TaskStore::open(&ctx);
            tasks.set_filter(status);
            tasks.set_priority_filter(priority);
            tasks.set_search(search);
            render::print_task_table(&tasks.filtered_tasks())
        }

        Command::Done { id } => {
            let mut tasks = TaskStore::open(&ctx);
            let id = resolve_id(&tasks.tasks(), &id)?;
            tasks.toggle_done(&id);
            println!("Toggled task {}.", short_id(&id));
            Ok(())
        }

        Command::Update {
            id,
            title,
            notes,
            priority,
        } => {
            let mut tasks = TaskStore::open(&ctx);
            let id = resolve_id(&tasks.tasks(), &id)?;
            let patch = TaskPatch {
                title,
                notes,
                priority: priority
                    .as_deref()
                    .map(str::parse::<Priority>)
                    .transpose()?,
            };
            tasks.update_task(&id, patch)?;
            println!("Updated task {}.", short_id(&id));
            Ok(())
        }

        Command::Delete { id } => {
            let mut tasks = TaskStore::open(&ctx);
            let id = resolve_id(&tasks.tasks(), &id)?;
            tasks.delete_task(&id);
            println!("Deleted task {}.", short_id(&id));
            Ok(())
        }

        Command::ClearCompleted => {
            let mut tasks = TaskStore::open(&ctx);
            let before = tasks.stats().total;
            tasks.clear_completed();
            let removed = before - tasks.stats().total;
            println!("Cleared {removed} completed task(s).");
            Ok(())
        }

        Command::Clear => {
            let mut tasks = TaskStore::open(&ctx);
            tasks.clear_tasks();
            println!("Cleared all tasks.");
            Ok(())
        }

        Command::Export => {
            let tasks = TaskStore::open(&ctx);
            let collection = tasks.tasks();
            serde_json::to_writer_pretty(std::io::stdout().lock(), &collection)
                .context("failed to write task export")?;
            println!();
            Ok(())
        }

        Command::Import => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read import payload")?;
            let collection: Vec<Task> =
                serde_json::from_str(&raw).context("import payload is not a task collection")?;

            let mut tasks = TaskStore::open(&ctx);
            let count = collection.len();
            tasks.replace_all(collection);
            info!(count, "imported task collection");
            println!("Imported {count} task(s).");
            Ok(())
        }

        Command::Stats => {
            let tasks = TaskStore::open(&ctx);
            render::print_stats(&tasks.stats())
        }

        Command::Theme { value } => {
            let theme = SyncedCell::new(&ctx, schema::keys::THEME, "system".to_string());
            match value {
                Some(value) => {
                    theme.set(value.clone());
                    println!("Theme set to {value}.");
                }
                None => println!("{}", theme.get()),
            }
            Ok(())
        }
    }
}

fn short_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(id.len());
    &id[..end]
}

/// Resolve an exact id or a unique id prefix. Prefix matching is a CLI
/// convenience only; store operations always take full ids.
fn resolve_id(tasks: &[Task], needle: &str) -> anyhow::Result<String> {
    if let Some(task) = tasks.iter().find(|task| task.id == needle) {
        return Ok(task.id.clone());
    }

    let mut matches = tasks.iter().filter(|task| task.id.starts_with(needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no task matches id {needle}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("id {needle} is ambiguous"));
    }
    Ok(first.id.clone())
}
