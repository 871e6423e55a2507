//! Database schema migrations for habit-league.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: users, habits and records, matching the first desktop release.
///
/// `records.created_at` holds a day label in that release; v2 rewrites it.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            points     INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS habits (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_name TEXT NOT NULL,
            points     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            points     INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: audit columns on records.
///
/// Adds:
/// - delta: signed change applied by the mutation
/// - source: `habit` or `league_cost`
///
/// Legacy rows stored a per-day net delta under a `%d %b %Y` label, so
/// `points` is copied into `delta` and the label is rewritten to RFC 3339
/// midnight UTC when it parses. `points` is then recomputed as the running
/// total of deltas in time order. Upkeep was never recorded in that
/// release, so the last running total can differ from the balance row.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE records ADD COLUMN delta INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE records ADD COLUMN source TEXT NOT NULL DEFAULT 'habit';
         UPDATE records SET delta = points;",
    )?;

    let legacy: Vec<(i64, String)> = {
        let mut stmt = tx.prepare("SELECT id, created_at FROM records")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<SqliteResult<_>>()?
    };
    for (id, label) in legacy {
        if let Ok(day) = chrono::NaiveDate::parse_from_str(&label, "%d %b %Y") {
            if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
                tx.execute(
                    "UPDATE records SET created_at = ?1 WHERE id = ?2",
                    rusqlite::params![crate::history::format_timestamp(midnight.and_utc()), id],
                )?;
            }
        }
    }

    let deltas: Vec<(i64, i64)> = {
        let mut stmt = tx.prepare("SELECT id, delta FROM records ORDER BY created_at ASC, id ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<SqliteResult<_>>()?
    };
    let mut running: i64 = 0;
    for (id, delta) in deltas {
        running = running.saturating_add(delta);
        tx.execute(
            "UPDATE records SET points = ?1 WHERE id = ?2",
            rusqlite::params![running, id],
        )?;
    }

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: habits reject zero points and blank names at the table level.
///
/// SQLite cannot add a CHECK to an existing table, so the table is rebuilt.
/// Rows that break the constraint could never be completed and are dropped.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE habits_v3 (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_name TEXT NOT NULL CHECK (length(trim(habit_name)) > 0),
            points     INTEGER NOT NULL CHECK (points != 0)
        );
        INSERT INTO habits_v3 (id, habit_name, points)
            SELECT id, habit_name, points FROM habits
            WHERE points != 0 AND length(trim(habit_name)) > 0;
        DROP TABLE habits;
        ALTER TABLE habits_v3 RENAME TO habits;",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        // All audit columns exist on a fresh schema
        let stmt = conn
            .prepare("SELECT id, points, delta, source, created_at FROM records")
            .unwrap();
        drop(stmt);
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    /// Databases written by the first desktop release have no schema_version
    /// table and day-label timestamps.
    #[test]
    fn test_upgrade_legacy_records() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                points INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE habits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                habit_name TEXT NOT NULL,
                points INTEGER NOT NULL
            );
            CREATE TABLE records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                points INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            INSERT INTO records (points, created_at) VALUES (-30, '05 Mar 2024');
            INSERT INTO records (points, created_at) VALUES (80, 'garbage');
            INSERT INTO records (points, created_at) VALUES (50, '04 Mar 2024');
            INSERT INTO habits (habit_name, points) VALUES ('Read', 30);
            INSERT INTO habits (habit_name, points) VALUES ('  ', 10);
            INSERT INTO habits (habit_name, points) VALUES ('Idle', 0);",
        )
        .unwrap();

        migrate(&conn).unwrap();

        let (delta, source, created_at): (i64, String, String) = conn
            .query_row(
                "SELECT delta, source, created_at FROM records WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(delta, -30);
        assert_eq!(source, "habit");
        assert_eq!(created_at, "2024-03-05T00:00:00.000000Z");

        // Unparseable labels are left as-is
        let created_at: String = conn
            .query_row("SELECT created_at FROM records WHERE id = 2", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(created_at, "garbage");

        // points becomes the running balance in time order: 50, 20, 100
        let totals: Vec<(i64, i64)> = conn
            .prepare("SELECT id, points FROM records ORDER BY created_at, id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<SqliteResult<_>>()
            .unwrap();
        assert_eq!(totals, vec![(3, 50), (1, 20), (2, 100)]);

        // Only the valid habit survives the v3 rebuild
        let habits: Vec<String> = conn
            .prepare("SELECT habit_name FROM habits")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<SqliteResult<_>>()
            .unwrap();
        assert_eq!(habits, vec!["Read".to_string()]);
    }

    #[test]
    fn test_habits_table_rejects_invalid_rows() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert!(conn
            .execute("INSERT INTO habits (habit_name, points) VALUES ('Walk', 0)", [])
            .is_err());
        assert!(conn
            .execute("INSERT INTO habits (habit_name, points) VALUES ('   ', 5)", [])
            .is_err());
        assert!(conn
            .execute("INSERT INTO habits (habit_name, points) VALUES ('Walk', 5)", [])
            .is_ok());
    }
}
