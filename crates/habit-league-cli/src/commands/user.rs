use clap::Subcommand;

use super::{open_tracker, print_json, CommandResult};

#[derive(Subcommand)]
pub enum UserAction {
    /// Show the balance, creating it on first use
    Show,
}

pub fn run(action: UserAction) -> CommandResult {
    let tracker = open_tracker()?;
    match action {
        UserAction::Show => print_json(&tracker.create_or_get_user()?),
    }
}
