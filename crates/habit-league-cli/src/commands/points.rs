use clap::Subcommand;

use super::{open_tracker, print_json, CommandResult};

#[derive(Subcommand)]
pub enum PointsAction {
    /// Add points to the balance (negative to subtract)
    Add {
        #[arg(allow_negative_numbers = true)]
        points: i64,
    },
}

pub fn run(action: PointsAction) -> CommandResult {
    let tracker = open_tracker()?;
    match action {
        PointsAction::Add { points } => print_json(&tracker.update_user_points(points)?),
    }
}
