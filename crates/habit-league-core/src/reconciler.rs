//! Periodic league upkeep.
//!
//! The poller owns at most one background task. Each tick charges the
//! upkeep of the league the committed balance currently sits in and
//! publishes the result only when the charge actually moved the points.
//!
//! ```rust,ignore
//! let poller = ReconciliationPoller::new(ledger, LeagueTable::reference(), UpkeepPolicy::EveryTick, DEFAULT_INTERVAL);
//! poller.start();
//! let mut rx = poller.subscribe();
//! rx.changed().await?;
//! poller.stop().await;
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::Result;
use crate::ledger::{Balance, PointsLedger};
use crate::league::{LeagueTable, UpkeepPolicy};

/// Default time between two upkeep charges.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

struct PollerInner {
    ledger: Arc<PointsLedger>,
    leagues: LeagueTable,
    policy: UpkeepPolicy,
    reported: watch::Sender<Balance>,
}

impl PollerInner {
    fn tick(&self) -> Result<Option<Balance>> {
        let mut before = None;
        let balance = self.ledger.apply_upkeep(|current| {
            before = Some(current.points);
            let league = self.leagues.current_league(current.points);
            self.policy
                .charge(league.league_cost, current.updated_at, Utc::now())
        })?;

        // Movement is measured against the balance the charge was taken from.
        if before == Some(balance.points) {
            return Ok(None);
        }
        self.reported.send_replace(balance.clone());
        Ok(Some(balance))
    }
}

struct RunningTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ReconciliationPoller {
    inner: Arc<PollerInner>,
    interval: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl ReconciliationPoller {
    pub fn new(
        ledger: Arc<PointsLedger>,
        leagues: LeagueTable,
        policy: UpkeepPolicy,
        interval: Duration,
    ) -> Self {
        let (reported, _) = watch::channel(ledger.snapshot());
        Self {
            inner: Arc::new(PollerInner {
                ledger,
                leagues,
                policy,
                reported,
            }),
            interval,
            task: Mutex::new(None),
        }
    }

    /// Run one reconciliation now. Returns the new balance if the points changed.
    pub fn tick(&self) -> Result<Option<Balance>> {
        self.inner.tick()
    }

    /// Spawn the recurring task on the current tokio runtime.
    ///
    /// Returns `false` if a task is already running. The first charge happens
    /// one full interval after this call.
    pub fn start(&self) -> bool {
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("reconciliation poller already running");
            return false;
        }

        // Habit deltas may have landed while stopped.
        let snapshot = self.inner.ledger.snapshot();
        self.inner.reported.send_if_modified(|last| {
            if last.points == snapshot.points {
                return false;
            }
            *last = snapshot;
            true
        });

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => match inner.tick() {
                        Ok(Some(balance)) => {
                            info!(points = balance.points, "league upkeep applied");
                        }
                        Ok(None) => {}
                        Err(e) => warn!("reconciliation failed, retrying next tick: {e}"),
                    },
                }
            }
        });

        info!(interval = ?period, "reconciliation poller started");
        *slot = Some(RunningTask { shutdown, handle });
        true
    }

    /// Stop the task and wait for it to exit. Returns `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        let running = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(task) = running else {
            return false;
        };

        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            warn!("reconciliation task ended abnormally: {e}");
        }
        info!("reconciliation poller stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Balances published by ticks that changed the points.
    pub fn subscribe(&self) -> watch::Receiver<Balance> {
        self.inner.reported.subscribe()
    }

    pub fn last_reported(&self) -> Balance {
        self.inner.reported.borrow().clone()
    }
}

impl Drop for ReconciliationPoller {
    fn drop(&mut self) {
        let slot = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.take() {
            task.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RecordSource;
    use crate::storage::Database;

    fn ledger_with(points: i64) -> Arc<PointsLedger> {
        let ledger = PointsLedger::new(Database::open_memory().unwrap()).unwrap();
        if points != 0 {
            ledger.apply_delta(points).unwrap();
        }
        Arc::new(ledger)
    }

    fn poller(ledger: &Arc<PointsLedger>) -> ReconciliationPoller {
        ReconciliationPoller::new(
            Arc::clone(ledger),
            LeagueTable::reference(),
            UpkeepPolicy::EveryTick,
            DEFAULT_INTERVAL,
        )
    }

    fn upkeep_records(ledger: &PointsLedger) -> usize {
        ledger
            .with_db(|db| db.history().list())
            .unwrap()
            .iter()
            .filter(|r| r.source == RecordSource::LeagueCost)
            .count()
    }

    #[test]
    fn tick_charges_current_league() {
        let ledger = ledger_with(520);
        let poller = poller(&ledger);

        let balance = poller.tick().unwrap().expect("points should change");
        assert_eq!(balance.points, 500);
        assert_eq!(
            LeagueTable::reference().current_league(balance.points).title,
            "iron"
        );
        assert_eq!(poller.last_reported().points, 500);
    }

    #[test]
    fn tick_in_free_league_is_silent() {
        let ledger = ledger_with(120);
        let poller = poller(&ledger);
        let rx = poller.subscribe();

        assert!(poller.tick().unwrap().is_none());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(upkeep_records(&ledger), 0);
    }

    #[test]
    fn tick_back_to_last_reported_value_still_reports() {
        let ledger = ledger_with(500);
        let poller = poller(&ledger);
        let rx = poller.subscribe();

        ledger.apply_delta(20).unwrap();
        let balance = poller.tick().unwrap().expect("upkeep moved the points");
        assert_eq!(balance.points, 500);
        assert!(rx.has_changed().unwrap());
        assert_eq!(poller.last_reported().points, 500);
    }

    #[test]
    fn failed_tick_keeps_last_reported() {
        let ledger = ledger_with(700);
        let poller = poller(&ledger);
        ledger
            .with_db(|db| Ok(db.conn().execute_batch("DROP TABLE records;")?))
            .unwrap();

        assert!(poller.tick().is_err());
        assert_eq!(poller.last_reported().points, 700);
        assert_eq!(ledger.get_or_create_user().unwrap().points, 700);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_ticks_until_free_league() {
        let ledger = ledger_with(520);
        let poller = poller(&ledger);
        let mut rx = poller.subscribe();

        assert!(poller.start());
        // 520 -> 500 (iron) -> 480 (zhest, free) and then nothing more
        tokio::time::sleep(DEFAULT_INTERVAL * 6 + Duration::from_millis(10)).await;
        assert!(poller.stop().await);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().points, 480);
        assert_eq!(ledger.get_or_create_user().unwrap().points, 480);
        assert_eq!(upkeep_records(&ledger), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_is_retried_on_next_interval() {
        let ledger = ledger_with(700);
        let poller = poller(&ledger);
        let mut rx = poller.subscribe();
        ledger
            .with_db(|db| Ok(db.conn().execute_batch("ALTER TABLE records RENAME TO records_off;")?))
            .unwrap();

        poller.start();
        tokio::time::sleep(DEFAULT_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(ledger.get_or_create_user().unwrap().points, 700);
        assert!(!rx.has_changed().unwrap());
        assert!(poller.is_running());

        ledger
            .with_db(|db| Ok(db.conn().execute_batch("ALTER TABLE records_off RENAME TO records;")?))
            .unwrap();
        tokio::time::sleep(DEFAULT_INTERVAL).await;
        poller.stop().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().points, 680);
        assert_eq!(upkeep_records(&ledger), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_charge_waits_one_interval() {
        let ledger = ledger_with(1000);
        let poller = poller(&ledger);
        poller.start();

        tokio::time::sleep(DEFAULT_INTERVAL / 2).await;
        assert_eq!(ledger.get_or_create_user().unwrap().points, 1000);

        tokio::time::sleep(DEFAULT_INTERVAL).await;
        assert_eq!(ledger.get_or_create_user().unwrap().points, 960);
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let ledger = ledger_with(1000);
        let poller = poller(&ledger);

        assert!(!poller.stop().await);
        assert!(poller.start());
        assert!(!poller.start());
        assert!(poller.is_running());

        tokio::time::sleep(DEFAULT_INTERVAL + Duration::from_millis(10)).await;
        assert!(poller.stop().await);
        assert!(!poller.stop().await);
        assert!(!poller.is_running());

        // A single task charged exactly once
        assert_eq!(ledger.get_or_create_user().unwrap().points, 960);

        // Nothing else happens once stopped
        tokio::time::sleep(DEFAULT_INTERVAL * 4).await;
        assert_eq!(ledger.get_or_create_user().unwrap().points, 960);

        // And it can be restarted
        assert!(poller.start());
        tokio::time::sleep(DEFAULT_INTERVAL + Duration::from_millis(10)).await;
        poller.stop().await;
        // 960 is back in iron
        assert_eq!(ledger.get_or_create_user().unwrap().points, 940);
    }

    #[tokio::test(start_paused = true)]
    async fn habit_points_between_ticks_change_the_charge() {
        let ledger = ledger_with(400);
        let poller = poller(&ledger);
        poller.start();

        // Reaching steel before the first tick means steel upkeep is charged
        ledger.apply_delta(600).unwrap();
        tokio::time::sleep(DEFAULT_INTERVAL + Duration::from_millis(10)).await;
        poller.stop().await;

        assert_eq!(ledger.get_or_create_user().unwrap().points, 960);
    }
}
