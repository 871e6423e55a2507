//! Command surface shared by every frontend.
//!
//! [`Tracker`] bundles the ledger, the habit catalog, the history log and
//! the league settings behind one handle. Each method maps to one user
//! action and returns plain serializable values.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::Result;
use crate::habits::{Habit, HabitQuery, NewHabit};
use crate::history::{DailyPoints, HistoryRecord};
use crate::ledger::{Balance, PointsLedger};
use crate::league::{LeagueProgress, LeagueTable, ProgressBand, UpkeepPolicy};
use crate::reconciler::ReconciliationPoller;
use crate::storage::{Config, Database};

pub struct Tracker {
    ledger: Arc<PointsLedger>,
    leagues: LeagueTable,
    policy: UpkeepPolicy,
    band: ProgressBand,
    interval: Duration,
}

impl Tracker {
    /// Open the database in the data directory.
    pub fn open(config: &Config) -> Result<Self> {
        Self::new(Database::open()?, config)
    }

    pub fn new(db: Database, config: &Config) -> Result<Self> {
        Ok(Self {
            ledger: Arc::new(PointsLedger::new(db)?),
            leagues: config.league_table(),
            policy: config.upkeep_policy(),
            band: config.display.progress_band,
            interval: config.interval(),
        })
    }

    pub fn ledger(&self) -> &Arc<PointsLedger> {
        &self.ledger
    }

    pub fn create_or_get_user(&self) -> Result<Balance> {
        self.ledger.get_or_create_user()
    }

    pub fn update_user_points(&self, points: i64) -> Result<Balance> {
        self.ledger.apply_delta(points)
    }

    /// Charge `league_cost` through the configured upkeep policy and return
    /// the resulting point total.
    pub fn check_user_update(&self, league_cost: i64) -> Result<i64> {
        let policy = self.policy;
        let balance = self
            .ledger
            .apply_upkeep(|current| policy.charge(league_cost, current.updated_at, Utc::now()))?;
        Ok(balance.points)
    }

    pub fn get_records(&self) -> Result<Vec<HistoryRecord>> {
        self.ledger.with_db(|db| db.history().list())
    }

    pub fn daily_totals(&self) -> Result<Vec<DailyPoints>> {
        self.ledger.with_db(|db| db.history().daily_totals())
    }

    /// Delete every history record. The balance is kept.
    pub fn reset_records(&self) -> Result<usize> {
        self.ledger.with_db(|db| db.history().reset_all())
    }

    pub fn create_habit(&self, habit: &NewHabit) -> Result<Habit> {
        self.ledger.with_db(|db| db.habits().create(habit))
    }

    pub fn update_habit(&self, id: i64, habit: &NewHabit) -> Result<Habit> {
        self.ledger.with_db(|db| db.habits().update(id, habit))
    }

    pub fn delete_habit(&self, id: i64) -> Result<()> {
        self.ledger.with_db(|db| db.habits().delete(id))
    }

    pub fn get_habits(&self, query: HabitQuery) -> Result<Vec<Habit>> {
        self.ledger.with_db(|db| db.habits().list(query))
    }

    /// Mark a habit done: its points are applied to the balance.
    pub fn complete_habit(&self, id: i64) -> Result<Balance> {
        let habit = self.ledger.with_db(|db| db.habits().get(id))?;
        let balance = self.update_user_points(habit.points)?;
        tracing::info!(habit = %habit.habit_name, points = balance.points, "habit completed");
        Ok(balance)
    }

    pub fn league_status(&self) -> Result<LeagueProgress> {
        self.league_status_with(self.band)
    }

    pub fn league_status_with(&self, band: ProgressBand) -> Result<LeagueProgress> {
        let balance = self.create_or_get_user()?;
        Ok(self.leagues.progress(balance.points, band))
    }

    pub fn league_table(&self) -> &LeagueTable {
        &self.leagues
    }

    /// Run one reconciliation against the league the balance currently sits in.
    pub fn reconcile_once(&self) -> Result<Balance> {
        let (leagues, policy) = (&self.leagues, self.policy);
        self.ledger.apply_upkeep(|current| {
            let cost = leagues.current_league(current.points).league_cost;
            policy.charge(cost, current.updated_at, Utc::now())
        })
    }

    /// A poller wired to this tracker's ledger and settings. Not started.
    pub fn poller(&self) -> ReconciliationPoller {
        ReconciliationPoller::new(
            Arc::clone(&self.ledger),
            self.leagues.clone(),
            self.policy,
            self.interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ValidationError};
    use crate::history::RecordSource;

    fn tracker() -> Tracker {
        Tracker::new(Database::open_memory().unwrap(), &Config::default()).unwrap()
    }

    #[test]
    fn complete_habit_applies_its_points() {
        let t = tracker();
        let gym = t.create_habit(&NewHabit::new("Gym", 50).unwrap()).unwrap();
        let snack = t.create_habit(&NewHabit::new("Snack", -20).unwrap()).unwrap();

        t.complete_habit(gym.id).unwrap();
        let balance = t.complete_habit(snack.id).unwrap();
        assert_eq!(balance.points, 30);

        let deltas: Vec<i64> = t.get_records().unwrap().iter().map(|r| r.delta).collect();
        assert_eq!(deltas, vec![50, -20]);
    }

    #[test]
    fn completing_missing_habit_changes_nothing() {
        let t = tracker();
        assert!(matches!(
            t.complete_habit(42),
            Err(CoreError::NotFound { entity: "habit", id: 42 })
        ));
        assert_eq!(t.create_or_get_user().unwrap().points, 0);
        assert!(t.get_records().unwrap().is_empty());
    }

    #[test]
    fn check_user_update_returns_points() {
        let t = tracker();
        t.update_user_points(520).unwrap();
        assert_eq!(t.check_user_update(20).unwrap(), 500);
        assert_eq!(t.check_user_update(0).unwrap(), 500);
        assert!(matches!(
            t.check_user_update(-1),
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn inactivity_policy_skips_recent_activity() {
        let mut config = Config::default();
        config.set("reconciliation.policy", "inactivity").unwrap();
        let t = Tracker::new(Database::open_memory().unwrap(), &config).unwrap();
        t.update_user_points(700).unwrap();

        // Balance just changed, so no whole period has elapsed
        assert_eq!(t.check_user_update(20).unwrap(), 700);
    }

    #[test]
    fn reconcile_once_uses_current_league() {
        let t = tracker();
        t.update_user_points(1000).unwrap();
        assert_eq!(t.reconcile_once().unwrap().points, 960);
        let last = t.get_records().unwrap().pop().unwrap();
        assert_eq!(last.source, RecordSource::LeagueCost);
    }

    #[test]
    fn league_status_follows_balance() {
        let t = tracker();
        t.update_user_points(2499).unwrap();
        assert_eq!(t.league_status().unwrap().league.title, "silver");
        t.update_user_points(1).unwrap();
        let status = t.league_status().unwrap();
        assert_eq!(status.league.title, "gold");
        assert_eq!(status.upper_bound, 2999);
        assert_eq!(
            t.league_status_with(ProgressBand::NextTier).unwrap().upper_bound,
            2999
        );
    }

    #[test]
    fn reset_records_keeps_balance() {
        let t = tracker();
        t.update_user_points(15).unwrap();
        assert_eq!(t.reset_records().unwrap(), 1);
        assert!(t.get_records().unwrap().is_empty());
        assert_eq!(t.create_or_get_user().unwrap().points, 15);
    }

    #[test]
    fn habit_crud_through_tracker() {
        let t = tracker();
        let h = t.create_habit(&NewHabit::new("Walk", 10).unwrap()).unwrap();
        t.update_habit(h.id, &NewHabit::new("Long walk", 25).unwrap()).unwrap();
        assert_eq!(t.get_habits(HabitQuery::default()).unwrap()[0].points, 25);
        t.delete_habit(h.id).unwrap();
        assert!(t.get_habits(HabitQuery::default()).unwrap().is_empty());
    }
}
