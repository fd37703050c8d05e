use anyhow::{anyhow, Result};
use tally_core::error::CoreError;
use tally_core::models::{Character, Task};
use tally_core::repository::Repository;

use crate::views::table::short_id;

/// Finds a task by full id, or by a unique head or tail of its id.
pub async fn resolve_task(repo: &impl Repository, id: &str) -> Result<Task> {
    if let Some(task) = repo.find_task(id).await {
        return Ok(task);
    }
    if id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }

    let mut tasks = repo.find_tasks_by_short_id(id).await;
    match tasks.len() {
        1 => Ok(tasks.remove(0)),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No task found matching ID '{}'",
            id
        )))),
        _ => {
            let candidates: Vec<String> = tasks
                .iter()
                .map(|t| format!("{} ({} / {})", short_id(&t.id), t.character, t.name))
                .collect();
            Err(anyhow!(CoreError::InvalidInput(format!(
                "Ambiguous ID '{}'. Did you mean one of: {}",
                id,
                candidates.join(", ")
            ))))
        }
    }
}

/// Finds a roster character by id or name.
pub async fn resolve_character(repo: &impl Repository, id_or_name: &str) -> Result<Character> {
    repo.find_character(id_or_name.trim()).await.ok_or_else(|| {
        anyhow!(CoreError::NotFound(format!(
            "No character named '{}'",
            id_or_name
        )))
    })
}
