mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, DisplayConfig, ReconciliationConfig, UpkeepPolicyKind};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/habit-league[-dev]/` based on HABIT_LEAGUE_ENV.
///
/// Set HABIT_LEAGUE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HABIT_LEAGUE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("habit-league-dev")
    } else {
        base_dir.join("habit-league")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
