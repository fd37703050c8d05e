use anyhow::Result;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tally_core::clock::SystemClock;
use tally_core::reconcile::{ReconcileSummary, Reconciler};
use tally_core::repository::{LocalRepository, TaskRepository};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use crate::cli::{ReconcileCommand, WatchCommand};
use crate::config::Config;
use crate::parser::parse_optional_when;
use crate::views::table::short_id;

pub async fn reconcile_once(repo: Arc<LocalRepository>, command: ReconcileCommand, config: &Config) -> Result<()> {
    let at = parse_optional_when(command.at.as_deref())?;
    let reconciler = Reconciler::new(Arc::clone(&repo), Arc::new(SystemClock), config.schedule()?);
    let summary = reconciler.tick_at(at).await;
    print_summary(&repo, &summary).await;
    Ok(())
}

async fn print_summary(repo: &LocalRepository, summary: &ReconcileSummary) {
    if summary.cleared.is_empty() {
        println!("{} Nothing to reset ({} tasks checked)", "✓".green().bold(), summary.examined);
    } else {
        println!(
            "{} Reset {} of {} tasks",
            "↺".yellow().bold(),
            summary.cleared.len(),
            summary.examined
        );
        for id in &summary.cleared {
            let name = repo.find_task(id).await.map(|t| format!("{} ({})", t.name, t.character));
            println!("  {} {}", short_id(id).yellow(), name.unwrap_or_default());
        }
    }
    if summary.malformed > 0 {
        println!(
            "  {}",
            format!("{} had unreadable completion times and were reset", summary.malformed).bright_black()
        );
    }
    if summary.orphaned > 0 {
        println!(
            "  {}",
            format!("{} belong to characters no longer in the roster", summary.orphaned).bright_black()
        );
    }
}

pub async fn watch(repo: Arc<LocalRepository>, command: WatchCommand, config: &Config) -> Result<()> {
    let mut reconciler_config = config.reconciler()?;
    if let Some(ms) = command.interval_ms {
        reconciler_config.interval = Duration::from_millis(ms);
    }

    let handle = Reconciler::spawn(Arc::clone(&repo), Arc::new(SystemClock), reconciler_config);
    let mut summaries = handle.summaries();
    let mut notices = repo.subscribe_notices();
    info!("watching for resets");
    println!("Watching for resets. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = summaries.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = summaries.borrow_and_update().clone();
                if summary.changed() {
                    print_summary(&repo, &summary).await;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => crate::report_notice(&notice),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown();
    repo.flush().await?;
    println!("Stopped.");
    Ok(())
}
