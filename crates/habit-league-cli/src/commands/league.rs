use clap::{Subcommand, ValueEnum};
use habit_league_core::ProgressBand;

use super::{open_tracker, print_json, CommandResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum BandArg {
    Fixed,
    NextTier,
}

#[derive(Subcommand)]
pub enum LeagueAction {
    /// Current league and progress towards the next one
    Status {
        /// Override the configured progress band
        #[arg(long, value_enum)]
        band: Option<BandArg>,
    },
    /// Print the league table
    Table,
}

pub fn run(action: LeagueAction) -> CommandResult {
    let tracker = open_tracker()?;
    match action {
        LeagueAction::Status { band } => {
            let status = match band {
                Some(BandArg::Fixed) => tracker.league_status_with(ProgressBand::Fixed)?,
                Some(BandArg::NextTier) => tracker.league_status_with(ProgressBand::NextTier)?,
                None => tracker.league_status()?,
            };
            print_json(&status)
        }
        LeagueAction::Table => print_json(&tracker.league_table().leagues()),
    }
}
