use anyhow::{anyhow, Result};
use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};
use tally_core::error::CoreError;
use tally_core::models::PresetScope;
use tally_core::repository::Repository;

use crate::cli::{PresetCommand, PresetSubcommand, ToggleTaskCommand};
use crate::config::Config;
use crate::util::resolve_character;
use crate::views::table::display_presets;

pub async fn preset_command(repo: &impl Repository, command: PresetCommand) -> Result<()> {
    let success_style = Style::new().green().bold();

    match command.command {
        PresetSubcommand::Save(cmd) => {
            let character = resolve_character(repo, &cmd.from).await?;
            let preset = repo.save_preset(&cmd.name, &character.name).await?;
            let enabled = preset.enabled.values().filter(|v| **v).count();
            println!(
                "{} Saved preset {} from {} ({} enabled)",
                "✓".style(success_style),
                preset.name.bright_white().bold(),
                character.name,
                enabled
            );
        }
        PresetSubcommand::Apply(cmd) => {
            let scope = match cmd.character {
                Some(name) => PresetScope::Character(resolve_character(repo, &name).await?.name),
                None => PresetScope::Roster,
            };
            let target = match &scope {
                PresetScope::Character(name) => name.clone(),
                PresetScope::Roster => "every character".to_string(),
            };
            repo.apply_preset(&cmd.name, scope).await?;
            println!(
                "{} Applied preset {} to {}",
                "✓".style(success_style),
                cmd.name.bright_white().bold(),
                target
            );
        }
        PresetSubcommand::List => display_presets(&repo.presets().await),
        PresetSubcommand::Delete(cmd) => {
            if !cmd.force {
                let confirmation = Confirm::new()
                    .with_prompt(format!("Delete preset '{}'?", cmd.name))
                    .default(false)
                    .interact()
                    .unwrap_or(false);

                if !confirmation {
                    println!("Deletion cancelled.");
                    return Ok(());
                }
            }
            let removed = repo.delete_preset(&cmd.name).await?;
            println!("{} Deleted preset: {}", "✓".style(success_style), removed.name);
        }
    }

    Ok(())
}

/// Switches an optional template on or off for one character.
pub async fn toggle_task(repo: &impl Repository, command: ToggleTaskCommand, enabled: bool, config: &Config) -> Result<()> {
    let character = resolve_character(repo, &command.character).await?;
    let template = config
        .templates
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(command.task.trim()))
        .ok_or_else(|| {
            let optional: Vec<&str> = config
                .templates
                .iter()
                .filter(|t| t.optional)
                .map(|t| t.name.as_str())
                .collect();
            anyhow!(CoreError::InvalidInput(format!(
                "Unknown task template '{}'. Optional templates: {}",
                command.task,
                optional.join(", ")
            )))
        })?;

    if !template.optional {
        println!(
            "{}",
            format!("'{}' is not optional; it applies to every character anyway", template.name).yellow()
        );
    }

    repo.set_task_enabled(&character.name, &template.name, enabled).await?;
    let state = if enabled { "enabled".green().to_string() } else { "disabled".red().to_string() };
    println!("{} {} for {}", template.name.bright_white().bold(), state, character.name);
    Ok(())
}
