//! SQLite handle shared by the ledger, history log and habit catalog.
//!
//! Tables:
//! - `users`: the single balance row
//! - `habits`: habit definitions
//! - `records`: append-only point history

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};
use crate::habits::HabitCatalog;
use crate::history::HistoryLog;

/// SQLite database for balance, habits and history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, needed to open a checked transaction.
    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Open the database at `~/.config/habit-league/habit-league.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("habit-league.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        tracing::debug!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// History log over this connection.
    pub fn history(&self) -> HistoryLog<'_> {
        HistoryLog::new(&self.conn)
    }

    /// Habit catalog over this connection.
    pub fn habits(&self) -> HabitCatalog<'_> {
        HabitCatalog::new(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_applies_schema() {
        let db = Database::open_memory().unwrap();
        assert_eq!(
            migrations::get_schema_version(db.conn()),
            migrations::SCHEMA_VERSION
        );
    }

    #[test]
    fn reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league.db");

        {
            let db = Database::open_at(&path).unwrap();
            db.conn()
                .execute("INSERT INTO users (points, updated_at) VALUES (42, 0)", [])
                .unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let points: i64 = db
            .conn()
            .query_row("SELECT points FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(points, 42);
    }

    #[test]
    fn open_at_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("league.db");
        assert!(matches!(
            Database::open_at(&path),
            Err(crate::error::CoreError::Database(DatabaseError::OpenFailed { .. }))
        ));
    }
}
