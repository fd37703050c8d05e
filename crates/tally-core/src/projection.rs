//! Read-only views over the task collection.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{Character, Task, ViewState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    #[default]
    All,
    Finished,
    Unfinished,
    Hidden,
}

impl fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFilter::All => write!(f, "all"),
            TaskFilter::Finished => write!(f, "finished"),
            TaskFilter::Unfinished => write!(f, "unfinished"),
            TaskFilter::Hidden => write!(f, "hidden"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid filter: {0}")]
pub struct ParseTaskFilterError(String);

impl FromStr for TaskFilter {
    type Err = ParseTaskFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(TaskFilter::All),
            "finished" | "done" => Ok(TaskFilter::Finished),
            "unfinished" | "todo" => Ok(TaskFilter::Unfinished),
            "hidden" => Ok(TaskFilter::Hidden),
            _ => Err(ParseTaskFilterError(s.to_string())),
        }
    }
}

/// Roster ordering and visibility needed to project tasks.
#[derive(Debug, Clone)]
pub struct ProjectionContext {
    rank: HashMap<String, usize>,
    hidden: BTreeSet<String>,
}

impl ProjectionContext {
    /// Characters named in the persisted order come first, in that order;
    /// the rest of the roster follows in roster order. Order entries naming
    /// no roster character are ignored.
    pub fn new(characters: &[Character], view: &ViewState) -> Self {
        let in_roster: BTreeSet<&str> = characters.iter().map(|c| c.name.as_str()).collect();
        let mut rank = HashMap::with_capacity(characters.len());

        let ordered = view
            .character_order
            .iter()
            .map(String::as_str)
            .filter(|name| in_roster.contains(name))
            .chain(characters.iter().map(|c| c.name.as_str()));
        for name in ordered {
            let next = rank.len();
            rank.entry(name.to_string()).or_insert(next);
        }

        Self {
            rank,
            hidden: view.hidden_characters.clone(),
        }
    }

    pub fn is_orphan(&self, task: &Task) -> bool {
        !self.rank.contains_key(&task.character)
    }

    pub fn is_hidden(&self, character: &str) -> bool {
        self.hidden.contains(character)
    }

    fn matches(&self, task: &Task, filter: TaskFilter) -> bool {
        match filter {
            TaskFilter::All => true,
            TaskFilter::Finished => task.completed,
            TaskFilter::Unfinished => !task.completed && !self.is_hidden(&task.character),
            TaskFilter::Hidden => self.is_hidden(&task.character),
        }
    }

    /// Roster characters in display order.
    pub fn ordered_characters(&self) -> Vec<&str> {
        let mut names: Vec<(&str, usize)> = self.rank.iter().map(|(n, r)| (n.as_str(), *r)).collect();
        names.sort_by_key(|(_, r)| *r);
        names.into_iter().map(|(n, _)| n).collect()
    }

    /// `(done, total)` over the character's tasks. Zero for unknown characters.
    pub fn progress(&self, tasks: &[Task], character: &str) -> (usize, usize) {
        if !self.rank.contains_key(character) {
            return (0, 0);
        }
        tasks
            .iter()
            .filter(|t| t.character == character)
            .fold((0, 0), |(done, total), t| (done + usize::from(t.completed), total + 1))
    }
}

/// Tasks matching `filter`, optionally restricted to one character, in
/// character display order. Orphaned tasks never appear.
pub fn project<'a>(
    tasks: &'a [Task],
    filter: TaskFilter,
    character: Option<&str>,
    ctx: &ProjectionContext,
) -> Vec<&'a Task> {
    let mut selected: Vec<&Task> = tasks
        .iter()
        .filter(|t| !ctx.is_orphan(t))
        .filter(|t| character.map_or(true, |c| t.character == c))
        .filter(|t| ctx.matches(t, filter))
        .collect();
    // Stable, so insertion order holds within a character.
    selected.sort_by_key(|t| ctx.rank.get(&t.character).copied().unwrap_or(usize::MAX));
    selected
}

/// Tasks whose character is not in the roster.
pub fn orphaned<'a>(tasks: &'a [Task], ctx: &ProjectionContext) -> Vec<&'a Task> {
    tasks.iter().filter(|t| ctx.is_orphan(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, StoredInstant};
    use chrono::Utc;
    use rstest::rstest;

    fn character(name: &str, order: u32) -> Character {
        Character {
            id: format!("c-{name}"),
            name: name.to_string(),
            level: 1,
            exp: 0,
            is_main: false,
            order,
        }
    }

    fn task(id: &str, character: &str, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            character: character.to_string(),
            name: id.to_string(),
            frequency: Frequency::Daily,
            completed,
            category: String::new(),
            due_date: None,
            last_completed_at: None,
            priority: None,
            note: None,
            created_at: StoredInstant::Valid(Utc::now()),
        }
    }

    fn fixture() -> (Vec<Task>, ProjectionContext) {
        let roster = vec![character("Aria", 0), character("Bram", 1), character("Cato", 2)];
        let view = ViewState {
            character_order: vec!["Cato".to_string(), "Nobody".to_string(), "Aria".to_string()],
            hidden_characters: ["Bram".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let tasks = vec![
            task("a1", "Aria", false),
            task("b1", "Bram", false),
            task("c1", "Cato", true),
            task("g1", "Ghost", false),
            task("a2", "Aria", true),
            task("c2", "Cato", false),
        ];
        (tasks, ProjectionContext::new(&roster, &view))
    }

    fn ids(tasks: Vec<&Task>) -> Vec<&str> {
        tasks.into_iter().map(|t| t.id.as_str()).collect()
    }

    #[rstest]
    #[case(TaskFilter::All, vec!["c1", "c2", "a1", "a2", "b1"])]
    #[case(TaskFilter::Finished, vec!["c1", "a2"])]
    #[case(TaskFilter::Unfinished, vec!["c2", "a1"])]
    #[case(TaskFilter::Hidden, vec!["b1"])]
    fn test_project_filters_in_character_order(#[case] filter: TaskFilter, #[case] expected: Vec<&str>) {
        let (tasks, ctx) = fixture();
        assert_eq!(ids(project(&tasks, filter, None, &ctx)), expected);
    }

    #[test]
    fn test_project_single_character() {
        let (tasks, ctx) = fixture();
        assert_eq!(ids(project(&tasks, TaskFilter::All, Some("Aria"), &ctx)), vec!["a1", "a2"]);
        assert!(project(&tasks, TaskFilter::All, Some("Ghost"), &ctx).is_empty());
    }

    #[test]
    fn test_orphans_and_progress() {
        let (tasks, ctx) = fixture();
        assert_eq!(ids(orphaned(&tasks, &ctx)), vec!["g1"]);
        assert_eq!(ctx.progress(&tasks, "Aria"), (1, 2));
        assert_eq!(ctx.progress(&tasks, "Ghost"), (0, 0));
        assert_eq!(ctx.ordered_characters(), vec!["Cato", "Aria", "Bram"]);
    }

    #[test]
    fn test_filter_from_str() {
        assert_eq!("Unfinished".parse::<TaskFilter>(), Ok(TaskFilter::Unfinished));
        assert_eq!("done".parse::<TaskFilter>(), Ok(TaskFilter::Finished));
        assert!("someday".parse::<TaskFilter>().is_err());
    }
}
