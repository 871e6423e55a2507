use clap::Subcommand;

use super::{open_tracker, print_json, CommandResult};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Every point change, oldest first
    List,
    /// Net change and closing balance per day
    Daily,
    /// Delete all history records. The balance is kept.
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

pub fn run(action: HistoryAction) -> CommandResult {
    let tracker = open_tracker()?;

    match action {
        HistoryAction::List => print_json(&tracker.get_records()?)?,
        HistoryAction::Daily => print_json(&tracker.daily_totals()?)?,
        HistoryAction::Reset { yes } => {
            if !yes {
                return Err("refusing to delete history without --yes".into());
            }
            let removed = tracker.reset_records()?;
            println!("{removed} records deleted");
        }
    }
    Ok(())
}
