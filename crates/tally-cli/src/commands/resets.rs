use anyhow::Result;
use tally_core::models::Frequency;

use crate::cli::ResetsCommand;
use crate::config::Config;
use crate::parser::parse_optional_when;
use crate::timezone::normalize_timezone_input;
use crate::views::table::{display_resets, ResetRow};

pub fn show_resets(command: ResetsCommand, config: &Config) -> Result<()> {
    let at = parse_optional_when(command.at.as_deref())?;
    let timezone = match command.timezone {
        Some(tz) => normalize_timezone_input(&tz)?,
        None => config.display_timezone.clone(),
    };
    let schedule = config.schedule()?;

    let rows: Vec<ResetRow> = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly]
        .into_iter()
        .map(|frequency| ResetRow {
            label: frequency.to_string(),
            last: schedule.most_recent_boundary(at, frequency),
            next: schedule.next_boundary(at, frequency),
            until: schedule.time_until_next(at, frequency),
        })
        .collect();

    display_resets(&rows, &timezone);
    Ok(())
}
