use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::reset::ResetSchedule;

/// How often a task's completion flag is cleared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Frequency::Daily),
            "weekly" | "week" => Ok(Frequency::Weekly),
            "monthly" | "month" => Ok(Frequency::Monthly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task priority: {0}")]
pub struct ParseTaskPriorityError(String);

impl FromStr for TaskPriority {
    type Err = ParseTaskPriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(ParseTaskPriorityError(s.to_string())),
        }
    }
}

/// A timestamp as found in storage.
///
/// Persisted dates are not trusted: anything that does not parse as an
/// RFC 3339 string or an epoch-millisecond number is kept verbatim as
/// `Malformed` so that it survives an export/import round trip, and the
/// reconciler treats it as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredInstant {
    Valid(DateTime<Utc>),
    Malformed(String),
}

impl StoredInstant {
    pub fn valid(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredInstant::Valid(dt) => Some(*dt),
            StoredInstant::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StoredInstant::Malformed(_))
    }

    /// Interprets a raw JSON value. `null` yields `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Self::parse(s)),
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(ms) => Self::from_millis(ms),
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| Self::from_millis(f as i64))
                    .unwrap_or_else(|| StoredInstant::Malformed(n.to_string())),
            }),
            other => Some(StoredInstant::Malformed(other.to_string())),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(dt) => StoredInstant::Valid(dt.with_timezone(&Utc)),
            Err(_) => StoredInstant::Malformed(raw.to_string()),
        }
    }

    fn from_millis(ms: i64) -> Self {
        match DateTime::from_timestamp_millis(ms) {
            Some(dt) => StoredInstant::Valid(dt),
            None => StoredInstant::Malformed(ms.to_string()),
        }
    }
}

impl From<DateTime<Utc>> for StoredInstant {
    fn from(dt: DateTime<Utc>) -> Self {
        StoredInstant::Valid(dt)
    }
}

impl fmt::Display for StoredInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredInstant::Valid(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            StoredInstant::Malformed(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for StoredInstant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StoredInstant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct InstantVisitor;

        impl<'de> Visitor<'de> for InstantVisitor {
            type Value = StoredInstant;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an RFC 3339 string or epoch milliseconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StoredInstant::parse(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(StoredInstant::from_millis(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                match i64::try_from(v) {
                    Ok(ms) => Ok(StoredInstant::from_millis(ms)),
                    Err(_) => Ok(StoredInstant::Malformed(v.to_string())),
                }
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                if v.is_finite() {
                    Ok(StoredInstant::from_millis(v as i64))
                } else {
                    Ok(StoredInstant::Malformed(v.to_string()))
                }
            }
        }

        deserializer.deserialize_any(InstantVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    pub level: u32,
    pub exp: u64,
    pub is_main: bool,
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Character name. Not an owning reference: the character may be gone.
    pub character: String,
    pub name: String,
    pub frequency: Frequency,
    pub completed: bool,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<StoredInstant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<StoredInstant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: StoredInstant,
}

/// Optional task templates switched on per character: character -> template -> enabled.
pub type EnabledTasks = BTreeMap<String, BTreeMap<String, bool>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPreset {
    pub name: String,
    pub enabled: BTreeMap<String, bool>,
    pub created_at: StoredInstant,
}

/// Where a preset is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetScope {
    Character(String),
    /// Every character currently in the roster.
    Roster,
}

/// Pure UI continuity state. Carries no business invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub collapsed_sections: BTreeMap<String, bool>,
    pub hidden_characters: BTreeSet<String>,
    pub expanded_lists: BTreeMap<String, bool>,
    pub character_order: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCharacterData {
    pub name: String,
    pub level: Option<u32>,
    pub exp: Option<u64>,
    pub is_main: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCharacterData {
    pub name: Option<String>,
    pub level: Option<u32>,
    pub exp: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NewTaskData {
    pub character: String,
    pub name: String,
    pub frequency: Frequency,
    pub category: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub note: Option<String>,
}

impl NewTaskData {
    pub fn new(character: impl Into<String>, name: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            character: character.into(),
            name: name.into(),
            frequency,
            category: String::new(),
            due_date: None,
            priority: None,
            note: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskData {
    pub name: Option<String>,
    pub character: Option<String>,
    pub frequency: Option<Frequency>,
    pub category: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Option<TaskPriority>>,
    pub note: Option<Option<String>>,
}

/// Configuration for the background reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Reset boundaries used to decide staleness
    pub schedule: ResetSchedule,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            schedule: ResetSchedule::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_frequency_from_str() {
        assert_eq!("Daily".parse::<Frequency>(), Ok(Frequency::Daily));
        assert_eq!(" weekly ".parse::<Frequency>(), Ok(Frequency::Weekly));
        assert_eq!("month".parse::<Frequency>(), Ok(Frequency::Monthly));
        assert!("yearly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("HIGH".parse::<TaskPriority>(), Ok(TaskPriority::High));
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_stored_instant_parses_rfc3339_and_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        let from_str: StoredInstant = serde_json::from_str("\"2024-03-06T00:00:00Z\"").unwrap();
        assert_eq!(from_str, StoredInstant::Valid(expected));

        let from_ms: StoredInstant = serde_json::from_str(&expected.timestamp_millis().to_string()).unwrap();
        assert_eq!(from_ms, StoredInstant::Valid(expected));
    }

    #[test]
    fn test_stored_instant_keeps_malformed_text() {
        let parsed: StoredInstant = serde_json::from_str("\"next tuesday-ish\"").unwrap();
        assert!(parsed.is_malformed());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"next tuesday-ish\"");
    }

    #[test]
    fn test_stored_instant_serializes_with_millis() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let json = serde_json::to_string(&StoredInstant::Valid(dt)).unwrap();
        assert_eq!(json, "\"2024-01-01T12:30:00.000Z\"");
    }

    #[test]
    fn test_task_serializes_camel_case_and_skips_empty_options() {
        let task = Task {
            id: "t1".to_string(),
            character: "Aria".to_string(),
            name: "Daily quests".to_string(),
            frequency: Frequency::Daily,
            completed: false,
            category: "quests".to_string(),
            due_date: None,
            last_completed_at: None,
            priority: Some(TaskPriority::Low),
            note: None,
            created_at: StoredInstant::Valid(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(value["priority"], "low");
        assert!(value.get("dueDate").is_none());
        assert!(value.get("note").is_none());
    }
}
