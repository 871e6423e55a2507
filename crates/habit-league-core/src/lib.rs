//! # Habit League Core Library
//!
//! Core logic for a habit tracker where completing habits earns points and
//! the balance places the user in a league tier. Higher leagues charge a
//! periodic upkeep, so the balance drifts down unless habits keep coming.
//! The CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Points Ledger**: the single authoritative balance. Every change is one
//!   SQLite transaction that also appends a history record
//! - **League Engine**: pure lookups from a balance to its tier and progress
//! - **Reconciliation Poller**: a tokio task charging league upkeep on an interval
//! - **Storage**: SQLite persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`Tracker`]: one handle over every user-facing operation
//! - [`PointsLedger`]: balance mutations and change notifications
//! - [`LeagueTable`]: tier lookup
//! - [`ReconciliationPoller`]: periodic upkeep
//! - [`Config`]: application configuration

pub mod commands;
pub mod error;
pub mod habits;
pub mod history;
pub mod league;
pub mod ledger;
pub mod reconciler;
pub mod storage;

pub use commands::Tracker;
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use habits::{Habit, HabitFilter, HabitKind, HabitQuery, HabitSort, NewHabit};
pub use history::{DailyPoints, HistoryRecord, RecordSource};
pub use league::{League, LeagueProgress, LeagueTable, ProgressBand, UpkeepPolicy};
pub use ledger::{Balance, PointsLedger};
pub use reconciler::ReconciliationPoller;
pub use storage::{Config, Database};
