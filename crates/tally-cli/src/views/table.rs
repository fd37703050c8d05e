use chrono::{DateTime, Utc};
use chrono_humanize::{HumanTime, Humanize};
use comfy_table::{Attribute, Cell, Color, Row, Table};
use tally_core::models::{Character, StoredInstant, Task, TaskPreset, TaskPriority, ViewState};

use crate::timezone::format_timezone_display;

/// Short form of an id for display. UUIDv7 ids share their leading
/// timestamp digits, so the tail is what tells them apart.
pub fn short_id(id: &str) -> &str {
    let start = id.len().saturating_sub(8);
    id.get(start..).unwrap_or(id)
}

fn instant_cell(instant: Option<&StoredInstant>) -> Cell {
    match instant {
        Some(StoredInstant::Valid(at)) => Cell::new(at.humanize()),
        Some(StoredInstant::Malformed(raw)) => Cell::new(format!("? {}", raw)).fg(Color::DarkGrey),
        None => Cell::new("None"),
    }
}

pub fn display_tasks(tasks: &[&Task], now: DateTime<Utc>) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Character", "Task", "Every", "Category", "Due", "Done"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&task.id)));
        row.add_cell(Cell::new(&task.character));

        let mut name_cell = Cell::new(&task.name);
        if task.completed {
            name_cell = name_cell.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey);
        } else {
            name_cell = match task.priority {
                Some(TaskPriority::High) => name_cell.fg(Color::Red).add_attribute(Attribute::Bold),
                Some(TaskPriority::Medium) => name_cell.fg(Color::Yellow),
                Some(TaskPriority::Low) => name_cell.fg(Color::Green),
                None => name_cell,
            };
        }
        row.add_cell(name_cell);

        row.add_cell(Cell::new(task.frequency.to_string()));
        row.add_cell(Cell::new(if task.category.is_empty() { "-" } else { &task.category }));

        let due_cell = match task.due_date.as_ref() {
            Some(StoredInstant::Valid(due)) if !task.completed => {
                let cell = Cell::new(due.humanize());
                if *due < now {
                    cell.fg(Color::Red)
                } else if due.date_naive() == now.date_naive() {
                    cell.fg(Color::Yellow)
                } else {
                    cell
                }
            }
            other => instant_cell(other),
        };
        row.add_cell(due_cell);

        let done_cell = if task.completed {
            Cell::new("✓").fg(Color::Green)
        } else {
            Cell::new("")
        };
        row.add_cell(done_cell);
        table.add_row(row);
    }

    println!("{table}");
}

pub struct CharacterRow<'a> {
    pub character: &'a Character,
    pub hidden: bool,
    pub done: usize,
    pub total: usize,
}

pub fn display_characters(rows: &[CharacterRow<'_>]) {
    if rows.is_empty() {
        println!("No characters yet.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Level", "Exp", "Progress", ""]);

    for row in rows {
        let character = row.character;
        let mut name_cell = Cell::new(&character.name);
        if character.is_main {
            name_cell = name_cell.add_attribute(Attribute::Bold);
        }
        if row.hidden {
            name_cell = name_cell.fg(Color::DarkGrey);
        }

        let progress = format!("{}/{}", row.done, row.total);
        let progress_cell = if row.total > 0 && row.done == row.total {
            Cell::new(progress).fg(Color::Green)
        } else {
            Cell::new(progress)
        };

        let mut badges = Vec::new();
        if character.is_main {
            badges.push("main");
        }
        if row.hidden {
            badges.push("hidden");
        }

        table.add_row(vec![
            Cell::new(short_id(&character.id)),
            name_cell,
            Cell::new(character.level),
            Cell::new(character.exp),
            progress_cell,
            Cell::new(badges.join(", ")),
        ]);
    }

    println!("{table}");
}

pub fn display_presets(presets: &[TaskPreset]) {
    if presets.is_empty() {
        println!("No presets saved.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Name", "Enabled", "Disabled", "Created"]);

    for preset in presets {
        let names = |wanted: bool| -> Vec<&str> {
            preset
                .enabled
                .iter()
                .filter(|&(_, &v)| v == wanted)
                .map(|(k, _)| k.as_str())
                .collect()
        };
        let (on, off) = (names(true), names(false));
        let mut row = Row::new();
        row.add_cell(Cell::new(&preset.name).add_attribute(Attribute::Bold));
        row.add_cell(Cell::new(on.join(", ")).fg(Color::Green));
        row.add_cell(Cell::new(off.join(", ")).fg(Color::DarkGrey));
        row.add_cell(instant_cell(Some(&preset.created_at)));
        table.add_row(row);
    }

    println!("{table}");
}

pub struct ResetRow {
    pub label: String,
    pub last: DateTime<Utc>,
    pub next: DateTime<Utc>,
    /// Time left from the instant the rows were computed for
    pub until: chrono::Duration,
}

pub fn display_resets(rows: &[ResetRow], timezone: &str) {
    let mut table = Table::new();
    table.set_header(vec!["Reset", "Last (UTC)", "Next (UTC)", "Next (local)", "In"]);

    for row in rows {
        let local = format_timezone_display(row.next, timezone).unwrap_or_else(|_| "-".to_string());
        table.add_row(vec![
            Cell::new(&row.label).add_attribute(Attribute::Bold),
            Cell::new(row.last.format("%a %Y-%m-%d %H:%M").to_string()),
            Cell::new(row.next.format("%a %Y-%m-%d %H:%M").to_string()),
            Cell::new(local),
            Cell::new(HumanTime::from(row.until)).fg(Color::Cyan),
        ]);
    }

    println!("{table}");
}

pub fn display_view_state(view: &ViewState) {
    let mut table = Table::new();
    table.set_header(vec!["Setting", "Value"]);

    let flagged = |map: &std::collections::BTreeMap<String, bool>| {
        let names: Vec<&str> = map.iter().filter(|&(_, &v)| v).map(|(k, _)| k.as_str()).collect();
        if names.is_empty() {
            "None".to_string()
        } else {
            names.join(", ")
        }
    };
    let hidden: Vec<&str> = view.hidden_characters.iter().map(String::as_str).collect();

    table.add_row(vec!["Collapsed sections".to_string(), flagged(&view.collapsed_sections)]);
    table.add_row(vec!["Expanded lists".to_string(), flagged(&view.expanded_lists)]);
    table.add_row(vec![
        "Hidden characters".to_string(),
        if hidden.is_empty() { "None".to_string() } else { hidden.join(", ") },
    ]);
    table.add_row(vec![
        "Character order".to_string(),
        if view.character_order.is_empty() {
            "Roster order".to_string()
        } else {
            view.character_order.join(" > ")
        },
    ]);

    println!("{table}");
}
