//! Habit management commands for CLI.

use clap::{Subcommand, ValueEnum};
use habit_league_core::{HabitFilter, HabitQuery, HabitSort, NewHabit};

use super::{open_tracker, print_json, CommandResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Id,
    Name,
    PointsAsc,
    PointsDesc,
}

impl From<SortArg> for HabitSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Id => HabitSort::Id,
            SortArg::Name => HabitSort::Name,
            SortArg::PointsAsc => HabitSort::PointsAscending,
            SortArg::PointsDesc => HabitSort::PointsDescending,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FilterArg {
    All,
    Rewards,
    Penalties,
}

impl From<FilterArg> for HabitFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => HabitFilter::All,
            FilterArg::Rewards => HabitFilter::Rewards,
            FilterArg::Penalties => HabitFilter::Penalties,
        }
    }
}

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Create {
        /// Habit name
        name: String,
        /// Points awarded on completion; negative for a penalty
        #[arg(allow_hyphen_values = true)]
        points: String,
    },
    /// List habits
    List {
        #[arg(long, value_enum, default_value = "id")]
        sort: SortArg,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// Replace a habit's name and points
    Update {
        /// Habit ID
        id: i64,
        name: String,
        #[arg(allow_hyphen_values = true)]
        points: String,
    },
    /// Delete a habit
    Delete {
        /// Habit ID
        id: i64,
    },
    /// Mark a habit done and apply its points
    Done {
        /// Habit ID
        id: i64,
    },
}

pub fn run(action: HabitAction) -> CommandResult {
    let tracker = open_tracker()?;

    match action {
        HabitAction::Create { name, points } => {
            let habit = tracker.create_habit(&NewHabit::parse(&name, &points)?)?;
            println!("Habit created: {}", habit.id);
            print_json(&habit)?;
        }
        HabitAction::List { sort, filter } => {
            let habits = tracker.get_habits(HabitQuery {
                sort: sort.into(),
                filter: filter.into(),
            })?;
            print_json(&habits)?;
        }
        HabitAction::Update { id, name, points } => {
            let habit = tracker.update_habit(id, &NewHabit::parse(&name, &points)?)?;
            print_json(&habit)?;
        }
        HabitAction::Delete { id } => {
            tracker.delete_habit(id)?;
            println!("Habit deleted: {id}");
        }
        HabitAction::Done { id } => {
            let balance = tracker.complete_habit(id)?;
            let status = tracker.league_status()?;
            println!("Points: {} ({})", balance.points, status.league.title);
        }
    }
    Ok(())
}
