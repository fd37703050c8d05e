//! Task templates: the recurring chores every character gets, plus
//! optional ones switched on per character through the enabled map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{Character, EnabledTasks, Frequency, NewTaskData, Task};
use crate::reset::ResetSchedule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub name: String,
    pub frequency: Frequency,
    #[serde(default)]
    pub category: String,
    /// Optional templates apply only where enabled.
    #[serde(default)]
    pub optional: bool,
}

impl TaskTemplate {
    pub fn new(name: &str, frequency: Frequency, category: &str, optional: bool) -> Self {
        Self {
            name: name.to_string(),
            frequency,
            category: category.to_string(),
            optional,
        }
    }

    pub fn applies_to(&self, character: &str, enabled: &EnabledTasks) -> bool {
        !self.optional
            || enabled
                .get(character)
                .and_then(|flags| flags.get(&self.name))
                .copied()
                .unwrap_or(false)
    }
}

pub fn default_templates() -> Vec<TaskTemplate> {
    vec![
        TaskTemplate::new("Daily quests", Frequency::Daily, "quests", false),
        TaskTemplate::new("Dungeon run", Frequency::Daily, "combat", false),
        TaskTemplate::new("Guild contribution", Frequency::Daily, "guild", true),
        TaskTemplate::new("Weekly boss", Frequency::Weekly, "combat", false),
        TaskTemplate::new("Guild raid", Frequency::Weekly, "guild", true),
        TaskTemplate::new("Monthly shop", Frequency::Monthly, "shop", true),
    ]
}

/// New tasks for every (character, template) pair that applies and has no
/// task of that name yet. Each is due at the template's next boundary.
pub fn materialize(
    templates: &[TaskTemplate],
    characters: &[Character],
    enabled: &EnabledTasks,
    tasks: &[Task],
    now: DateTime<Utc>,
    schedule: &ResetSchedule,
) -> Vec<NewTaskData> {
    let existing: HashSet<(&str, &str)> = tasks
        .iter()
        .map(|t| (t.character.as_str(), t.name.as_str()))
        .collect();

    characters
        .iter()
        .flat_map(|character| templates.iter().map(move |template| (character, template)))
        .filter(|(character, template)| template.applies_to(&character.name, enabled))
        .filter(|(character, template)| !existing.contains(&(character.name.as_str(), template.name.as_str())))
        .map(|(character, template)| NewTaskData {
            category: template.category.clone(),
            due_date: Some(schedule.next_boundary(now, template.frequency)),
            ..NewTaskData::new(character.name.clone(), template.name.clone(), template.frequency)
        })
        .collect()
}
