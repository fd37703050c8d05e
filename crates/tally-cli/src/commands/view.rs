use anyhow::Result;
use tally_core::repository::Repository;

use crate::cli::{ViewCommand, ViewSubcommand};
use crate::views::table::display_view_state;

pub async fn view_command(repo: &impl Repository, command: ViewCommand) -> Result<()> {
    match command.command {
        ViewSubcommand::Show => display_view_state(&repo.view_state().await),
        ViewSubcommand::Section { name } => {
            let collapsed = repo.toggle_section(&name).await?;
            println!("Section '{}' {}", name, if collapsed { "collapsed" } else { "expanded" });
        }
        ViewSubcommand::List { name } => {
            let expanded = repo.toggle_expanded(&name).await?;
            println!("List '{}' {}", name, if expanded { "expanded" } else { "shrunk" });
        }
    }
    Ok(())
}
