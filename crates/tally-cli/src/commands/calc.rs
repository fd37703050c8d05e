use anyhow::Result;
use chrono::Utc;
use chrono_humanize::Humanize;
use owo_colors::OwoColorize;
use tally_core::calc::ProgressProjection;

use crate::cli::CalcCommand;
use crate::config::Config;

pub fn calc(command: CalcCommand, config: &Config) -> Result<()> {
    let projection = ProgressProjection {
        current: command.current,
        target: command.target,
        daily_gain: command.daily,
        weekly_gain: command.weekly,
        monthly_gain: command.monthly,
    };

    if projection.remaining() == 0 {
        println!("{} Target already reached", "✓".green().bold());
        return Ok(());
    }

    match projection.project_completion(Utc::now(), &config.schedule()?) {
        Some(estimate) => {
            println!(
                "{} {} more needed; reached at the reset on {} ({})",
                "→".blue(),
                projection.remaining(),
                estimate.reached_at.format("%a %Y-%m-%d %H:%M UTC").to_string().cyan(),
                estimate.reached_at.humanize()
            );
            println!(
                "  {} daily, {} weekly and {} monthly resets, {} gained",
                estimate.daily_resets, estimate.weekly_resets, estimate.monthly_resets, estimate.total_gained
            );
        }
        None => println!("{}", "The target is out of reach with these gains.".yellow()),
    }
    Ok(())
}
