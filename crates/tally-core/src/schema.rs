//! Lenient decoding of persisted JSON.
//!
//! Stored documents may have been written by older versions, edited by hand
//! or truncated by a crash between two writes. Instead of rejecting a whole
//! key because one record is off, each record is coerced field by field:
//! wrongly-typed optional fields are dropped, wrongly-typed required fields
//! fall back to a default, and records that are not objects (or have no
//! name) are skipped. Every such repair is reported as a [`SchemaIssue`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::models::{
    Character, EnabledTasks, Frequency, StoredInstant, Task, TaskPreset, TaskPriority,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Position of the offending record, when the document is a list
    pub index: Option<usize>,
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "record {}: {}", index, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A decoded value plus the repairs made to obtain it.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced<T> {
    pub value: T,
    pub issues: Vec<SchemaIssue>,
}

impl<T> Coerced<T> {
    fn new(value: T, issues: Vec<SchemaIssue>) -> Self {
        Self { value, issues }
    }
}

struct Issues {
    list: Vec<SchemaIssue>,
    index: Option<usize>,
}

impl Issues {
    fn new() -> Self {
        Self {
            list: Vec::new(),
            index: None,
        }
    }

    fn push(&mut self, message: impl Into<String>) {
        self.list.push(SchemaIssue {
            index: self.index,
            message: message.into(),
        });
    }
}

fn as_records<'a>(value: &'a Value, what: &str, issues: &mut Issues) -> Vec<(usize, &'a Map<String, Value>)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Value::Object(map) => Some((index, map)),
                _ => {
                    issues.index = Some(index);
                    issues.push(format!("{what} is not an object; dropped"));
                    issues.index = None;
                    None
                }
            })
            .collect(),
        Value::Null => Vec::new(),
        _ => {
            issues.push(format!("expected a list of {what}s"));
            Vec::new()
        }
    }
}

fn string_field(map: &Map<String, Value>, field: &str) -> Option<String> {
    match map.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_field(map: &Map<String, Value>, field: &str, issues: &mut Issues) -> bool {
    match map.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        Some(other) => {
            issues.push(format!("field '{field}' is not a boolean ({other}); using false"));
            false
        }
    }
}

fn unsigned_field(map: &Map<String, Value>, field: &str, issues: &mut Issues) -> u64 {
    let parsed = match map.get(field) {
        None | Some(Value::Null) => return 0,
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        issues.push(format!("field '{field}' is not a non-negative number; using 0"));
        0
    })
}

fn instant_field(map: &Map<String, Value>, field: &str) -> Option<StoredInstant> {
    map.get(field).and_then(StoredInstant::from_json)
}

/// Decodes the `tasks` document.
pub fn coerce_tasks(value: &Value, now: DateTime<Utc>) -> Coerced<Vec<Task>> {
    let mut issues = Issues::new();
    let mut tasks = Vec::new();

    for (index, map) in as_records(value, "task", &mut issues) {
        issues.index = Some(index);

        let Some(name) = string_field(map, "name").filter(|n| !n.trim().is_empty()) else {
            issues.push("task has no name; dropped");
            continue;
        };

        let frequency = match string_field(map, "frequency").map(|f| f.parse::<Frequency>()) {
            Some(Ok(frequency)) => frequency,
            _ => {
                issues.push("task frequency missing or invalid; using daily");
                Frequency::Daily
            }
        };

        let priority = match string_field(map, "priority") {
            Some(raw) => match raw.parse::<TaskPriority>() {
                Ok(priority) => Some(priority),
                Err(e) => {
                    issues.push(e.to_string());
                    None
                }
            },
            None => None,
        };

        let created_at = instant_field(map, "createdAt").unwrap_or_else(|| {
            issues.push("task has no creation time; using now");
            StoredInstant::Valid(now)
        });

        tasks.push(Task {
            id: string_field(map, "id").unwrap_or_default(),
            character: string_field(map, "character").unwrap_or_default(),
            name,
            frequency,
            completed: bool_field(map, "completed", &mut issues),
            category: string_field(map, "category").unwrap_or_default(),
            due_date: instant_field(map, "dueDate"),
            last_completed_at: instant_field(map, "lastCompletedAt"),
            priority,
            note: string_field(map, "note"),
            created_at,
        });
    }

    Coerced::new(tasks, issues.list)
}

/// Decodes the `roster` document. Only the first character flagged as main keeps the flag.
pub fn coerce_characters(value: &Value) -> Coerced<Vec<Character>> {
    let mut issues = Issues::new();
    let mut characters: Vec<Character> = Vec::new();
    let mut seen_names = BTreeSet::new();
    let mut has_main = false;

    for (index, map) in as_records(value, "character", &mut issues) {
        issues.index = Some(index);

        let Some(name) = string_field(map, "name").filter(|n| !n.trim().is_empty()) else {
            issues.push("character has no name; dropped");
            continue;
        };
        if !seen_names.insert(name.clone()) {
            issues.push(format!("duplicate character name '{name}'; dropped"));
            continue;
        }

        let level = unsigned_field(map, "level", &mut issues);
        let level = u32::try_from(level).unwrap_or(u32::MAX);
        let exp = unsigned_field(map, "exp", &mut issues);

        let mut is_main = bool_field(map, "isMain", &mut issues);
        if is_main && has_main {
            issues.push(format!("'{name}' is a second main character; flag cleared"));
            is_main = false;
        }
        has_main |= is_main;

        let order = match map.get("order") {
            Some(Value::Number(n)) => n.as_u64().and_then(|o| u32::try_from(o).ok()),
            _ => None,
        }
        .unwrap_or(characters.len() as u32);

        characters.push(Character {
            id: string_field(map, "id").unwrap_or_default(),
            name,
            level,
            exp,
            is_main,
            order,
        });
    }

    Coerced::new(characters, issues.list)
}

/// Decodes an object of booleans, dropping non-boolean entries.
pub fn coerce_bool_map(value: &Value) -> Coerced<BTreeMap<String, bool>> {
    let mut issues = Issues::new();
    let map = bool_map(value, &mut issues);
    Coerced::new(map, issues.list)
}

fn bool_map(value: &Value, issues: &mut Issues) -> BTreeMap<String, bool> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| match v {
                Value::Bool(b) => Some((k.clone(), *b)),
                _ => {
                    issues.push(format!("entry '{k}' is not a boolean; dropped"));
                    None
                }
            })
            .collect(),
        Value::Null => BTreeMap::new(),
        _ => {
            issues.push("expected an object of booleans");
            BTreeMap::new()
        }
    }
}

/// Decodes the `enabledTasks` document.
pub fn coerce_enabled_tasks(value: &Value) -> Coerced<EnabledTasks> {
    let mut issues = Issues::new();
    let enabled = match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(character, inner)| match inner {
                Value::Object(_) => Some((character.clone(), bool_map(inner, &mut issues))),
                _ => {
                    issues.push(format!("enabled tasks for '{character}' are not an object; dropped"));
                    None
                }
            })
            .collect(),
        Value::Null => BTreeMap::new(),
        _ => {
            issues.push("expected an object keyed by character");
            BTreeMap::new()
        }
    };
    Coerced::new(enabled, issues.list)
}

/// Decodes the `taskPresets` document. Later presets with a repeated name are dropped.
pub fn coerce_presets(value: &Value, now: DateTime<Utc>) -> Coerced<Vec<TaskPreset>> {
    let mut issues = Issues::new();
    let mut presets: Vec<TaskPreset> = Vec::new();

    for (index, map) in as_records(value, "preset", &mut issues) {
        issues.index = Some(index);
        let Some(name) = string_field(map, "name").filter(|n| !n.trim().is_empty()) else {
            issues.push("preset has no name; dropped");
            continue;
        };
        if presets.iter().any(|p| p.name == name) {
            issues.push(format!("duplicate preset '{name}'; dropped"));
            continue;
        }
        let enabled = bool_map(map.get("enabled").unwrap_or(&Value::Null), &mut issues);
        let created_at = instant_field(map, "createdAt").unwrap_or(StoredInstant::Valid(now));
        presets.push(TaskPreset {
            name,
            enabled,
            created_at,
        });
    }

    Coerced::new(presets, issues.list)
}

/// Decodes a list of strings, dropping non-strings and repeats. Accepts an
/// object of booleans too, keeping the keys set to `true`.
pub fn coerce_string_list(value: &Value) -> Coerced<Vec<String>> {
    let mut issues = Issues::new();
    let mut out: Vec<String> = Vec::new();
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) if !out.contains(s) => out.push(s.clone()),
                    Value::String(_) => {}
                    _ => {
                        issues.index = Some(index);
                        issues.push("entry is not a string; dropped");
                    }
                }
            }
        }
        Value::Object(_) => {
            out = bool_map(value, &mut issues)
                .into_iter()
                .filter_map(|(k, v)| v.then_some(k))
                .collect();
        }
        Value::Null => {}
        _ => issues.push("expected a list of strings"),
    }
    Coerced::new(out, issues.list)
}
