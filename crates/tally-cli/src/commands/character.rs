use anyhow::Result;
use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};
use tally_core::models::{NewCharacterData, UpdateCharacterData};
use tally_core::projection::ProjectionContext;
use tally_core::repository::Repository;

use crate::cli::{CharacterCommand, CharacterSubcommand};
use crate::util::resolve_character;
use crate::views::table::{display_characters, CharacterRow};

pub async fn character_command(repo: &impl Repository, command: CharacterCommand) -> Result<()> {
    let success_style = Style::new().green().bold();

    match command.command {
        CharacterSubcommand::Add(cmd) => {
            let character = repo
                .add_character(NewCharacterData {
                    name: cmd.name,
                    level: cmd.level,
                    exp: cmd.exp,
                    is_main: cmd.main,
                })
                .await?;
            println!(
                "{} Added character: {}",
                "✓".style(success_style),
                character.name.bright_white().bold()
            );
        }
        CharacterSubcommand::List => list_characters(repo).await?,
        CharacterSubcommand::Edit(cmd) => {
            let character = resolve_character(repo, &cmd.character).await?;
            let old_name = character.name.clone();
            let updated = repo
                .update_character(
                    &character.id,
                    UpdateCharacterData {
                        name: cmd.name,
                        level: cmd.level,
                        exp: cmd.exp,
                    },
                )
                .await?;
            if updated.name != old_name {
                println!(
                    "{} Renamed {} to {}; tasks moved along",
                    "✓".style(success_style),
                    old_name.yellow(),
                    updated.name.bright_white().bold()
                );
            } else {
                println!(
                    "{} Updated {} (level {}, exp {})",
                    "✓".style(success_style),
                    updated.name.bright_white().bold(),
                    updated.level,
                    updated.exp
                );
            }
        }
        CharacterSubcommand::Remove(cmd) => {
            let character = resolve_character(repo, &cmd.character).await?;
            if !cmd.force {
                let confirmation = Confirm::new()
                    .with_prompt(format!(
                        "Remove '{}'? Their tasks stay stored but are no longer listed.",
                        character.name
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);

                if !confirmation {
                    println!("Removal cancelled.");
                    return Ok(());
                }
            }
            let removed = repo.remove_character(&character.id).await?;
            println!("{} Removed character: {}", "✓".style(success_style), removed.name);
        }
        CharacterSubcommand::Main(cmd) => {
            let character = resolve_character(repo, &cmd.character).await?;
            let main = repo.set_main(&character.id).await?;
            println!("{} {} is now the main character", "✓".style(success_style), main.name.bold());
        }
        CharacterSubcommand::Hide(cmd) => set_hidden(repo, &cmd.character, true).await?,
        CharacterSubcommand::Unhide(cmd) => set_hidden(repo, &cmd.character, false).await?,
        CharacterSubcommand::Order(cmd) => {
            repo.set_character_order(cmd.names).await?;
            list_characters(repo).await?;
        }
    }

    Ok(())
}

async fn set_hidden(repo: &impl Repository, id_or_name: &str, hidden: bool) -> Result<()> {
    let character = resolve_character(repo, id_or_name).await?;
    let changed = repo.set_hidden(&character.name, hidden).await?;
    let verb = if hidden { "hidden" } else { "shown" };
    if changed {
        println!("{} {} is now {}", "✓".green().bold(), character.name.bold(), verb);
    } else {
        println!("{} was already {}", character.name, verb);
    }
    Ok(())
}

async fn list_characters(repo: &impl Repository) -> Result<()> {
    let characters = repo.characters().await;
    let tasks = repo.tasks().await;
    let ctx = ProjectionContext::new(&characters, &repo.view_state().await);

    let rows: Vec<CharacterRow<'_>> = ctx
        .ordered_characters()
        .into_iter()
        .filter_map(|name| characters.iter().find(|c| c.name == name))
        .map(|character| {
            let (done, total) = ctx.progress(&tasks, &character.name);
            CharacterRow {
                character,
                hidden: ctx.is_hidden(&character.name),
                done,
                total,
            }
        })
        .collect();

    display_characters(&rows);
    Ok(())
}
