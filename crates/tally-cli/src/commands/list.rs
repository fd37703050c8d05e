use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;
use tally_core::projection::{orphaned, project, ProjectionContext};
use tally_core::repository::Repository;

use crate::cli::ListCommand;
use crate::config::Config;
use crate::util::resolve_character;
use crate::views::table::display_tasks;

pub async fn list_tasks(repo: &impl Repository, command: ListCommand, config: &Config) -> Result<()> {
    let filter = command.filter.unwrap_or(config.default_filter);
    let character = match command.character {
        Some(name) => Some(resolve_character(repo, &name).await?.name),
        None => None,
    };

    let tasks = repo.tasks().await;
    let characters = repo.characters().await;
    let ctx = ProjectionContext::new(&characters, &repo.view_state().await);

    let visible = project(&tasks, filter, character.as_deref(), &ctx);
    display_tasks(&visible, Utc::now());

    let orphans = orphaned(&tasks, &ctx);
    if command.orphans {
        if !orphans.is_empty() {
            println!("\n{}", "Tasks without a character in the roster:".yellow());
            display_tasks(&orphans, Utc::now());
        }
    } else if !orphans.is_empty() {
        println!(
            "{}",
            format!("{} task(s) belong to characters no longer in the roster (--orphans to show)", orphans.len())
                .bright_black()
        );
    }
    Ok(())
}
