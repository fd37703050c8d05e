use clap::Parser;
use owo_colors::{OwoColorize, Style};
use std::sync::Arc;
use tally_core::clock::SystemClock;
use tally_core::error::CoreError;
use tally_core::reconcile::Reconciler;
use tally_core::repository::{LocalRepository, Notice};
use tally_core::reset::ResetSchedule;
use tally_core::storage::SqliteStorage;
use tally_core::timezone::validate_timezone;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod parser;
mod timezone;
mod util;
mod views;

use cli::Commands;

fn init_tracing() {
    // TALLY_LOG wins over RUST_LOG; malformed filters fall back to warnings only.
    let filter = ["TALLY_LOG", "RUST_LOG"]
        .iter()
        .find_map(|var| {
            let raw = std::env::var(var).ok()?;
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = cli::Cli::parse();

    let mut config = config::Config::new().unwrap_or_else(|e| {
        warn!(error = %e, "could not load configuration; using defaults");
        config::Config::default()
    });
    if let Err(e) = validate_timezone(&config.display_timezone) {
        warn!(error = %e, "invalid display timezone; using UTC");
        config.display_timezone = "UTC".to_string();
    }

    let storage = match SqliteStorage::open(&config.database_path).await {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let repository = Arc::new(LocalRepository::open(Arc::new(storage)).await);
    let mut notices = repository.subscribe_notices();

    // `reconcile` and `watch` reconcile on their own terms.
    if !matches!(cli.command, Commands::Reconcile(_) | Commands::Watch(_)) {
        let schedule = config.schedule().unwrap_or_else(|e| {
            warn!(error = %e, "invalid reset schedule; using the default");
            ResetSchedule::default()
        });
        let summary = Reconciler::new(Arc::clone(&repository), Arc::new(SystemClock), schedule)
            .tick()
            .await;
        debug!(cleared = summary.cleared.len(), "startup reconcile");
    }

    let result = match cli.command {
        Commands::Character(command) => commands::character::character_command(&*repository, command).await,
        Commands::Add(command) => commands::task::add_task(&*repository, command).await,
        Commands::List(command) => commands::list::list_tasks(&*repository, command, &config).await,
        Commands::Done(command) => commands::task::done_task(&*repository, command).await,
        Commands::Undo(command) => commands::task::undo_task(&*repository, command).await,
        Commands::Edit(command) => commands::task::edit_task(&*repository, command).await,
        Commands::Delete(command) => commands::task::delete_task(&*repository, command).await,
        Commands::Reconcile(command) => {
            commands::reconcile::reconcile_once(Arc::clone(&repository), command, &config).await
        }
        Commands::Watch(command) => commands::reconcile::watch(Arc::clone(&repository), command, &config).await,
        Commands::Resets(command) => commands::resets::show_resets(command, &config),
        Commands::Preset(command) => commands::preset::preset_command(&*repository, command).await,
        Commands::Enable(command) => commands::preset::toggle_task(&*repository, command, true, &config).await,
        Commands::Disable(command) => commands::preset::toggle_task(&*repository, command, false, &config).await,
        Commands::Seed(command) => commands::seed::seed_tasks(&*repository, command, &config).await,
        Commands::View(command) => commands::view::view_command(&*repository, command).await,
        Commands::Export(command) => commands::snapshot::export(&repository, command).await,
        Commands::Import(command) => commands::snapshot::import(&repository, command).await,
        Commands::Calc(command) => commands::calc::calc(command, &config),
    };

    drain_notices(&mut notices);
    let flushed = repository.flush().await;
    drain_notices(&mut notices);

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
    if let Err(e) = flushed {
        handle_error(e.into());
        std::process::exit(1);
    }
}

fn drain_notices(notices: &mut broadcast::Receiver<Notice>) {
    loop {
        match notices.try_recv() {
            Ok(notice) => report_notice(&notice),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

fn report_notice(notice: &Notice) {
    let warning_style = Style::new().yellow().bold();
    match notice {
        Notice::SaveFailed { key, message } => {
            eprintln!("{} Could not save {}: {}", "Warning:".style(warning_style), key, message);
        }
        Notice::Recovered { key } => {
            eprintln!("{} Saved {} after an earlier failure", "✓".green(), key);
        }
        Notice::LoadFallback { key, message } => {
            eprintln!(
                "{} Stored {} was unreadable and was reset: {}",
                "Warning:".style(warning_style),
                key,
                message
            );
        }
        Notice::Repaired { key, issues } => {
            eprintln!("{} Repaired {} record(s) in {}", "Note:".blue().bold(), issues, key);
        }
        Notice::ExternalReload { key } => {
            eprintln!("{} {} changed elsewhere; reloaded", "Note:".blue().bold(), key);
        }
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::PresetNotFound(name) => {
                eprintln!(
                    "{} No preset named '{}'. Nothing was changed.",
                    "Error:".style(error_style),
                    name.yellow()
                );
            }
            CoreError::InvalidTimezone(s) => {
                eprintln!("{} Invalid timezone: {}", "Error:".style(error_style), s);
            }
            CoreError::Storage(e) => {
                eprintln!(
                    "{} {}. Your changes are kept in memory for this run only.",
                    "Error:".style(error_style),
                    e
                );
            }
            _ => eprintln!("{} {}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
