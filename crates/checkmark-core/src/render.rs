use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::store::Counts;
use crate::task::Task;

pub const EMPTY_MESSAGE: &str = "No tasks to show.";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, counts), fields(visible = tasks.len()))]
    pub fn print_task_list(&mut self, tasks: &[&Task], counts: Counts) -> anyhow::Result<()> {
        let colored = self.color && io::stdout().is_terminal();
        let mut out = io::stdout().lock();
        write_task_list(&mut out, tasks, counts, colored)
    }

    pub fn print_counts(&mut self, counts: Counts) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{counts}")?;
        Ok(())
    }
}

/// Table of `tasks` followed by the counts line, or the empty message.
pub fn write_task_list<W: Write>(
    mut writer: W,
    tasks: &[&Task],
    counts: Counts,
    colored: bool,
) -> anyhow::Result<()> {
    if tasks.is_empty() {
        writeln!(writer, "{EMPTY_MESSAGE}")?;
    } else {
        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Title".to_string(),
            "Created".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let id = paint(task.id.short(), "33", colored);
                let done = if task.done { "[x]" } else { "[ ]" }.to_string();
                let title = if task.done {
                    paint(&task.title, "2", colored)
                } else {
                    task.title.clone()
                };
                let created = task
                    .created_local()
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                vec![id, done, title, created]
            })
            .collect();

        write_table(&mut writer, headers, rows)?;
    }

    writeln!(writer, "{counts}")?;
    Ok(())
}

fn paint(text: &str, code: &str, colored: bool) -> String {
    if !colored {
        return text.to_string();
    }
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
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
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
