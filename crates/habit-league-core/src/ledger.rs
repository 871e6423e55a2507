//! Authoritative owner of the point balance.
//!
//! Every mutation is a read-modify-write of the single `users` row plus the
//! matching history append, committed as one SQLite transaction while the
//! ledger mutex is held. Observers get committed balances over a
//! `tokio::sync::watch` channel and never touch the row themselves.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{DatabaseError, Result, ValidationError};
use crate::history::{HistoryLog, RecordSource};
use crate::storage::Database;

/// The user's point balance. Exactly one exists per database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: i64,
    pub points: i64,
    /// Unix epoch milliseconds of the last mutation.
    pub updated_at: i64,
}

fn load_or_create(conn: &Connection) -> rusqlite::Result<Balance> {
    let existing = conn
        .query_row(
            "SELECT id, points, updated_at FROM users ORDER BY id LIMIT 1",
            [],
            |row| {
                Ok(Balance {
                    id: row.get(0)?,
                    points: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    if let Some(balance) = existing {
        return Ok(balance);
    }

    let updated_at = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO users (points, updated_at) VALUES (0, ?1)",
        params![updated_at],
    )?;
    tracing::info!("created balance row");
    Ok(Balance {
        id: conn.last_insert_rowid(),
        points: 0,
        updated_at,
    })
}

pub struct PointsLedger {
    db: Mutex<Database>,
    latest: watch::Sender<Balance>,
}

impl PointsLedger {
    /// Take ownership of the database, creating the balance row if needed.
    pub fn new(db: Database) -> Result<Self> {
        let balance = load_or_create(db.conn())?;
        let (latest, _) = watch::channel(balance);
        Ok(Self {
            db: Mutex::new(db),
            latest,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| DatabaseError::Poisoned.into())
    }

    /// Run `f` against the database while holding the ledger lock.
    pub fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.lock()?;
        f(&db)
    }

    /// Current balance, creating it with zero points on first access.
    pub fn get_or_create_user(&self) -> Result<Balance> {
        let db = self.lock()?;
        Ok(load_or_create(db.conn())?)
    }

    /// Add `delta` (any sign) to the balance.
    pub fn apply_delta(&self, delta: i64) -> Result<Balance> {
        self.mutate(RecordSource::Habit, |_| Ok(Some(delta)))
    }

    /// Deduct a league's upkeep. A zero cost is a no-op that still returns
    /// the current balance.
    pub fn apply_league_cost(&self, cost: i64) -> Result<Balance> {
        self.apply_upkeep(|_| cost)
    }

    /// Deduct upkeep computed from the balance as read inside the
    /// transaction, so the charge always matches the committed tier.
    pub fn apply_upkeep(&self, charge_for: impl FnOnce(&Balance) -> i64) -> Result<Balance> {
        self.mutate(RecordSource::LeagueCost, |current| {
            let cost = charge_for(current);
            if cost < 0 {
                return Err(ValidationError::InvalidValue {
                    field: "league_cost".into(),
                    message: format!("must not be negative, got {cost}"),
                }
                .into());
            }
            Ok((cost != 0).then_some(-cost))
        })
    }

    /// Read-modify-write under the lock. `delta_for` returning `None` leaves
    /// the balance and history untouched.
    fn mutate(
        &self,
        source: RecordSource,
        delta_for: impl FnOnce(&Balance) -> Result<Option<i64>>,
    ) -> Result<Balance> {
        let mut db = self.lock()?;
        let tx = db
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = load_or_create(&tx)?;
        let Some(delta) = delta_for(&current)? else {
            tx.commit()?;
            return Ok(current);
        };
        let points = current
            .points
            .checked_add(delta)
            .ok_or(ValidationError::Overflow {
                points: current.points,
                delta,
            })?;
        let now = Utc::now();

        tx.execute(
            "UPDATE users SET points = ?1, updated_at = ?2 WHERE id = ?3",
            params![points, now.timestamp_millis(), current.id],
        )?;
        HistoryLog::new(&tx).append(points, delta, source, now)?;
        tx.commit()?;

        let balance = Balance {
            id: current.id,
            points,
            updated_at: now.timestamp_millis(),
        };
        tracing::debug!(delta, points, ?source, "balance updated");
        self.latest.send_replace(balance.clone());
        Ok(balance)
    }

    /// Latest committed balance, without touching storage.
    pub fn snapshot(&self) -> Balance {
        self.latest.borrow().clone()
    }

    /// Receive every committed balance from now on.
    pub fn subscribe(&self) -> watch::Receiver<Balance> {
        self.latest.subscribe()
    }
}
