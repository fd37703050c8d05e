use anyhow::{Context, Result};
use dialoguer::Confirm;
use owo_colors::OwoColorize;
use tally_core::repository::LocalRepository;
use tally_core::snapshot::Snapshot;

use crate::cli::{ExportCommand, ImportCommand};

pub async fn export(repo: &LocalRepository, command: ExportCommand) -> Result<()> {
    let snapshot = repo.export_snapshot().await?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    match command.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write export to {}", path.display()))?;
            println!("{} Exported to {}", "✓".green().bold(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn import(repo: &LocalRepository, command: ImportCommand) -> Result<()> {
    let raw = std::fs::read_to_string(&command.file)
        .with_context(|| format!("Failed to read {}", command.file.display()))?;
    let snapshot = Snapshot::parse(&raw)?;

    if !command.force {
        let confirmation = Confirm::new()
            .with_prompt("Importing replaces all characters, tasks and settings. Continue?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Import cancelled.");
            return Ok(());
        }
    }

    let report = repo.import_snapshot(&snapshot).await?;
    println!(
        "{} Imported snapshot from {}",
        "✓".green().bold(),
        snapshot.exported_at.format("%Y-%m-%d %H:%M UTC")
    );
    if report.issues > 0 || report.reidentified > 0 {
        println!(
            "  {}",
            format!(
                "{} record(s) repaired, {} given new ids",
                report.issues, report.reidentified
            )
            .bright_black()
        );
    }
    Ok(())
}
