pub mod config;
pub mod habit;
pub mod history;
pub mod league;
pub mod points;
pub mod reconcile;
pub mod user;

use habit_league_core::{Config, Tracker};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Tracker over the default database with the saved config.
pub fn open_tracker() -> Result<Tracker, habit_league_core::CoreError> {
    let config = Config::load()?;
    Tracker::open(&config)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
