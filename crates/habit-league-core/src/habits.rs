//! Habit definitions.
//!
//! A habit is a named activity worth a signed, non-zero number of points.
//! Positive habits are rewards, negative ones penalties. Input is validated
//! before any row is written.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub habit_name: String,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitKind {
    Reward,
    Penalty,
}

impl Habit {
    pub fn kind(&self) -> HabitKind {
        if self.points > 0 {
            HabitKind::Reward
        } else {
            HabitKind::Penalty
        }
    }
}

/// Validated input for creating or replacing a habit.
///
/// Only obtainable through [`NewHabit::new`], [`NewHabit::parse`] or
/// deserialization, all of which validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHabit")]
pub struct NewHabit {
    habit_name: String,
    points: i64,
}

#[derive(Deserialize)]
struct RawHabit {
    habit_name: String,
    points: i64,
}

impl TryFrom<RawHabit> for NewHabit {
    type Error = ValidationError;

    fn try_from(raw: RawHabit) -> Result<Self, Self::Error> {
        Self::new(&raw.habit_name, raw.points)
    }
}

impl NewHabit {
    /// Validate and normalize: trims the name, rejects empty names and zero points.
    pub fn new(habit_name: &str, points: i64) -> Result<Self, ValidationError> {
        let habit_name = habit_name.trim();
        if habit_name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if points == 0 {
            return Err(ValidationError::ZeroPoints);
        }
        Ok(Self {
            habit_name: habit_name.to_string(),
            points,
        })
    }

    /// Same as [`NewHabit::new`] for points typed as text.
    pub fn parse(habit_name: &str, points: &str) -> Result<Self, ValidationError> {
        let parsed = points
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::NonNumericPoints(points.to_string()))?;
        Self::new(habit_name, parsed)
    }

    pub fn habit_name(&self) -> &str {
        &self.habit_name
    }

    pub fn points(&self) -> i64 {
        self.points
    }

    fn check(&self) -> Result<(), ValidationError> {
        Self::new(&self.habit_name, self.points).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitSort {
    #[default]
    Id,
    Name,
    PointsAscending,
    PointsDescending,
}

impl HabitSort {
    fn order_by(self) -> &'static str {
        match self {
            HabitSort::Id => "id ASC",
            HabitSort::Name => "habit_name COLLATE NOCASE ASC, id ASC",
            HabitSort::PointsAscending => "points ASC, id ASC",
            HabitSort::PointsDescending => "points DESC, id ASC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitFilter {
    #[default]
    All,
    Rewards,
    Penalties,
}

impl HabitFilter {
    fn where_clause(self) -> &'static str {
        match self {
            HabitFilter::All => "",
            HabitFilter::Rewards => "WHERE points > 0",
            HabitFilter::Penalties => "WHERE points < 0",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitQuery {
    #[serde(default)]
    pub sort: HabitSort,
    #[serde(default)]
    pub filter: HabitFilter,
}

fn row_to_habit(row: &rusqlite::Row) -> rusqlite::Result<Habit> {
    Ok(Habit {
        id: row.get(0)?,
        habit_name: row.get(1)?,
        points: row.get(2)?,
    })
}

fn not_found(id: i64) -> CoreError {
    CoreError::NotFound { entity: "habit", id }
}

/// Habit storage over a borrowed connection.
pub struct HabitCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> HabitCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, habit: &NewHabit) -> Result<Habit> {
        habit.check()?;
        self.conn.execute(
            "INSERT INTO habits (habit_name, points) VALUES (?1, ?2)",
            params![habit.habit_name, habit.points],
        )?;
        Ok(Habit {
            id: self.conn.last_insert_rowid(),
            habit_name: habit.habit_name.clone(),
            points: habit.points,
        })
    }

    pub fn get(&self, id: i64) -> Result<Habit> {
        self.conn
            .query_row(
                "SELECT id, habit_name, points FROM habits WHERE id = ?1",
                params![id],
                row_to_habit,
            )
            .optional()?
            .ok_or_else(|| not_found(id))
    }

    /// Replace name and points of an existing habit.
    pub fn update(&self, id: i64, habit: &NewHabit) -> Result<Habit> {
        habit.check()?;
        let changed = self.conn.execute(
            "UPDATE habits SET habit_name = ?1, points = ?2 WHERE id = ?3",
            params![habit.habit_name, habit.points, id],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(Habit {
            id,
            habit_name: habit.habit_name.clone(),
            points: habit.points,
        })
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM habits WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub fn list(&self, query: HabitQuery) -> Result<Vec<Habit>> {
        let sql = format!(
            "SELECT id, habit_name, points FROM habits {} ORDER BY {}",
            query.filter.where_clause(),
            query.sort.order_by()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_habit)?;
        let mut habits = Vec::new();
        for row in rows {
            habits.push(row?);
        }
        Ok(habits)
    }
}
