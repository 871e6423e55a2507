//! Append-only history of point changes.
//!
//! Each record stores the balance a mutation produced together with the
//! signed delta that produced it. Records are only ever written inside the
//! ledger's transaction, so a record is never visible without its balance.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What caused a point change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// A habit completion or a manual delta
    Habit,
    /// League upkeep charged by reconciliation
    LeagueCost,
}

impl RecordSource {
    fn as_str(self) -> &'static str {
        match self {
            RecordSource::Habit => "habit",
            RecordSource::LeagueCost => "league_cost",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "league_cost" => RecordSource::LeagueCost,
            _ => RecordSource::Habit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    /// Balance after the change.
    pub points: i64,
    pub delta: i64,
    pub source: RecordSource,
    pub created_at: DateTime<Utc>,
}

/// Net change and closing balance for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPoints {
    pub date: NaiveDate,
    pub delta: i64,
    pub closing_points: i64,
}

/// Fixed-width RFC 3339 so text ordering in SQL matches time ordering.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
    let source: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        points: row.get(1)?,
        delta: row.get(2)?,
        source: RecordSource::parse(&source),
        created_at: parse_datetime_fallback(&created_at),
    })
}

/// History log over a borrowed connection (or an open transaction).
pub struct HistoryLog<'c> {
    conn: &'c Connection,
}

impl<'c> HistoryLog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append a record and return its id.
    pub fn append(
        &self,
        points: i64,
        delta: i64,
        source: RecordSource,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO records (points, delta, source, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![points, delta, source.as_str(), format_timestamp(at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All records, oldest first.
    pub fn list(&self) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, points, delta, source, created_at FROM records
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Number of records.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Delete every record in one transaction. Returns how many were removed.
    ///
    /// The balance row is not touched.
    pub fn reset_all(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM records", [])?;
        tx.commit()?;
        tracing::info!(deleted, "history reset");
        Ok(deleted)
    }

    /// Per-day net delta and closing balance, oldest day first.
    pub fn daily_totals(&self) -> Result<Vec<DailyPoints>> {
        let mut days: Vec<DailyPoints> = Vec::new();
        for record in self.list()? {
            let date = record.created_at.date_naive();
            match days.last_mut() {
                Some(day) if day.date == date => {
                    day.delta += record.delta;
                    day.closing_points = record.points;
                }
                _ => days.push(DailyPoints {
                    date,
                    delta: record.delta,
                    closing_points: record.points,
                }),
            }
        }
        Ok(days)
    }
}
