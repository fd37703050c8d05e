use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;
use tally_core::repository::Repository;
use tally_core::templates::materialize;

use crate::cli::SeedCommand;
use crate::config::Config;
use crate::util::resolve_character;

/// Creates the missing template tasks. Running it twice adds nothing.
pub async fn seed_tasks(repo: &impl Repository, command: SeedCommand, config: &Config) -> Result<()> {
    let mut characters = repo.characters().await;
    if let Some(name) = command.character {
        let only = resolve_character(repo, &name).await?;
        characters.retain(|c| c.id == only.id);
    }

    let pending = materialize(
        &config.templates,
        &characters,
        &repo.enabled_tasks().await,
        &repo.tasks().await,
        Utc::now(),
        &config.schedule()?,
    );
    if pending.is_empty() {
        println!("{} Every character already has its tasks", "✓".green().bold());
        return Ok(());
    }

    let added = repo.add_tasks(pending).await?;
    println!("{} Created {} task(s)", "✓".green().bold(), added.len());
    for task in &added {
        println!("  {} {} / {}", "→".blue(), task.character, task.name.bright_white());
    }
    Ok(())
}
