use std::io::{self, Write};

use chrono::Local;

use crate::task::Task;
use crate::tasks::Stats;

const ID_PREFIX_LEN: usize = 8;

pub fn print_task_table(tasks: &[Task]) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();

    let headers = vec![
        "ID".to_string(),
        "Done".to_string(),
        "Pri".to_string(),
        "Title".to_string(),
        "Notes".to_string(),
        "Updated".to_string(),
    ];

    let mut rows = Vec::with_capacity(tasks.len());
    for task in tasks {
        let id = task.id.chars().take(ID_PREFIX_LEN).collect::<String>();
        let done = if task.done { "x" } else { "" }.to_string();
        let updated = task
            .updated_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();

        rows.push(vec![
            id,
            done,
            task.priority.to_string(),
            task.title.clone(),
            task.notes.clone().unwrap_or_default(),
            updated,
        ]);
    }

    write_table(&mut out, headers, rows)?;
    Ok(())
}

pub fn print_stats(stats: &Stats) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "total      {}", stats.total)?;
    writeln!(out, "active     {}", stats.active)?;
    writeln!(out, "completed  {}", stats.completed)?;
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(header.chars().count());
    }
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let padding = widths[idx].saturating_sub(cell.chars().count());
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}
