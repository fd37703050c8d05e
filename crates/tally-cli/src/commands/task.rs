use anyhow::Result;
use chrono::Utc;
use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};
use tally_core::models::{NewTaskData, UpdateTaskData};
use tally_core::repository::Repository;

use crate::cli::{AddCommand, DeleteCommand, DoneCommand, EditCommand, UndoCommand};
use crate::parser::{parse_optional_when, parse_when};
use crate::util::{resolve_character, resolve_task};
use crate::views::table::short_id;

pub async fn add_task(repo: &impl Repository, command: AddCommand) -> Result<()> {
    // Tasks for unknown characters would never be listed.
    let character = resolve_character(repo, &command.character).await?;
    let due_date = command
        .due
        .as_deref()
        .map(|d| parse_when(d, Utc::now()))
        .transpose()?;

    let added = repo
        .add_task(NewTaskData {
            category: command.category,
            due_date,
            priority: command.priority,
            note: command.note,
            ..NewTaskData::new(character.name, command.name, command.every)
        })
        .await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    println!(
        "{} Created {} task: {}",
        "✓".style(success_style),
        added.frequency,
        added.name.bright_white().bold()
    );
    println!("  {} Task ID: {}", "→".style(info_style), short_id(&added.id).yellow());
    println!("  {} Character: {}", "→".style(info_style), added.character);
    if let Some(due) = added.due_date.as_ref().and_then(|d| d.valid()) {
        println!(
            "  {} Due: {}",
            "→".style(info_style),
            due.format("%Y-%m-%d %H:%M").to_string().cyan()
        );
    }
    Ok(())
}

pub async fn done_task(repo: &impl Repository, command: DoneCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let at = parse_optional_when(command.at.as_deref())?;
    let done = repo.set_completed(&task.id, true, at).await?;
    println!(
        "{} Completed: {} ({})",
        "✓".green().bold(),
        done.name.bright_white().bold(),
        done.character
    );
    Ok(())
}

pub async fn undo_task(repo: &impl Repository, command: UndoCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let undone = repo.set_completed(&task.id, false, Utc::now()).await?;
    println!("{} Reopened: {}", "↺".yellow().bold(), undone.name.bright_white());
    Ok(())
}

pub async fn edit_task(repo: &impl Repository, command: EditCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;

    let character = match command.character {
        Some(name) => Some(resolve_character(repo, &name).await?.name),
        None => None,
    };
    let due_date = if command.due_clear {
        Some(None)
    } else {
        command
            .due
            .as_deref()
            .map(|d| parse_when(d, Utc::now()).map(Some))
            .transpose()?
    };
    let priority = if command.priority_clear {
        Some(None)
    } else {
        command.priority.map(Some)
    };
    let note = if command.note_clear {
        Some(None)
    } else {
        command.note.map(Some)
    };

    let update = UpdateTaskData {
        name: command.name,
        character,
        frequency: command.every,
        category: command.category,
        due_date,
        priority,
        note,
    };
    let updated = repo.update_task(&task.id, update).await?;
    println!(
        "{} Updated task {}: {}",
        "✓".green().bold(),
        short_id(&updated.id).yellow(),
        updated.name.bright_white().bold()
    );
    Ok(())
}

pub async fn delete_task(repo: &impl Repository, command: DeleteCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;

    if !command.force {
        let confirmation = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to delete task '{}' ({})?",
                task.name, task.character
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    let removed = repo.remove_task(&task.id).await?;
    println!("{} Deleted task: {}", "✓".green().bold(), removed.name);
    Ok(())
}
