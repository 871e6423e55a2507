//! League tiers derived from a point balance.
//!
//! Everything here is a pure function of the table and the latest balance;
//! no tier state is carried between calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Display width of a tier band, in points, above its lower bound.
pub const FIXED_BAND_SPAN: i64 = 499;

/// Milliseconds in one inactivity period charged by [`UpkeepPolicy::Inactivity`].
pub const DEFAULT_INACTIVITY_PERIOD_MS: i64 = 8_640_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub title: String,
    pub lower_bound: i64,
    /// Points deducted per reconciliation for staying in this league.
    pub league_cost: i64,
}

impl League {
    pub fn new(title: impl Into<String>, lower_bound: i64, league_cost: i64) -> Self {
        Self {
            title: title.into(),
            lower_bound,
            league_cost,
        }
    }
}

/// How the progress bar's upper bound is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBand {
    /// `lower_bound + 499` for every tier.
    #[default]
    Fixed,
    /// Up to the next tier's real lower bound (fixed band on the top tier).
    NextTier,
}

/// Snapshot of where a balance sits in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueProgress {
    pub points: i64,
    pub league: League,
    pub next: Option<League>,
    pub upper_bound: i64,
    /// Percentage through the band; not clamped.
    pub progress_pct: f64,
}

/// Ordered league table, ascending by `lower_bound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<League>", into = "Vec<League>")]
pub struct LeagueTable {
    leagues: Vec<League>,
}

impl LeagueTable {
    /// Build a table from tiers in definition order.
    ///
    /// Tiers are stably sorted by `lower_bound`, so with duplicate bounds the
    /// later-defined tier wins lookups. The lowest tier must start at 0 and
    /// no tier may have a negative cost.
    pub fn new(mut leagues: Vec<League>) -> Result<Self, ValidationError> {
        if leagues.is_empty() {
            return Err(ValidationError::EmptyLeagueTable);
        }
        leagues.sort_by_key(|l| l.lower_bound);

        if leagues[0].lower_bound != 0 {
            return Err(ValidationError::InvalidValue {
                field: "lower_bound".into(),
                message: format!(
                    "lowest league '{}' must start at 0, got {}",
                    leagues[0].title, leagues[0].lower_bound
                ),
            });
        }
        if let Some(l) = leagues.iter().find(|l| l.league_cost < 0) {
            return Err(ValidationError::InvalidValue {
                field: "league_cost".into(),
                message: format!("league '{}' has negative cost {}", l.title, l.league_cost),
            });
        }
        Ok(Self { leagues })
    }

    /// The eight tiers shipped with the app.
    pub fn reference() -> Self {
        Self {
            leagues: vec![
                League::new("zhest", 0, 0),
                League::new("iron", 500, 20),
                League::new("steel", 1000, 40),
                League::new("bronze", 1500, 60),
                League::new("silver", 2000, 80),
                League::new("gold", 2500, 100),
                League::new("platinum", 3000, 120),
                League::new("diamond", 3500, 140),
            ],
        }
    }

    pub fn leagues(&self) -> &[League] {
        &self.leagues
    }

    /// Index of the last tier whose lower bound is at or below `points`,
    /// floored at the lowest tier.
    fn position(&self, points: i64) -> usize {
        self.leagues
            .partition_point(|l| l.lower_bound <= points)
            .saturating_sub(1)
    }

    pub fn current_league(&self, points: i64) -> &League {
        &self.leagues[self.position(points)]
    }

    /// First tier strictly above the current one, if any.
    pub fn next_league(&self, points: i64) -> Option<&League> {
        let current = self.current_league(points);
        self.leagues[self.position(points) + 1..]
            .iter()
            .find(|l| l.lower_bound > current.lower_bound)
    }

    pub fn progress(&self, points: i64, band: ProgressBand) -> LeagueProgress {
        let league = self.current_league(points).clone();
        let next = self.next_league(points).cloned();

        let (upper_bound, progress_pct) = match (band, &next) {
            (ProgressBand::NextTier, Some(next)) => {
                let span = next.lower_bound.saturating_sub(league.lower_bound) as f64;
                (
                    next.lower_bound - 1,
                    points.saturating_sub(league.lower_bound) as f64 * 100.0 / span,
                )
            }
            _ => (upper_bound(&league), progress_fraction(points, &league)),
        };

        LeagueProgress {
            points,
            league,
            next,
            upper_bound,
            progress_pct,
        }
    }
}

impl Default for LeagueTable {
    fn default() -> Self {
        Self::reference()
    }
}

impl TryFrom<Vec<League>> for LeagueTable {
    type Error = ValidationError;

    fn try_from(leagues: Vec<League>) -> Result<Self, Self::Error> {
        Self::new(leagues)
    }
}

impl From<LeagueTable> for Vec<League> {
    fn from(table: LeagueTable) -> Self {
        table.leagues
    }
}

/// Display-only top of a tier's band. Never used for membership.
pub fn upper_bound(league: &League) -> i64 {
    league.lower_bound.saturating_add(FIXED_BAND_SPAN)
}

/// Percentage through the fixed band.
pub fn progress_fraction(points: i64, league: &League) -> f64 {
    points.saturating_sub(league.lower_bound) as f64 / 4.99
}

/// Turns a league cost into the charge for one reconciliation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpkeepPolicy {
    /// Charge the full cost on every tick.
    #[default]
    EveryTick,
    /// Charge once per whole period elapsed since the last balance change.
    Inactivity { period_ms: i64 },
}

impl UpkeepPolicy {
    pub fn charge(&self, league_cost: i64, updated_at_ms: i64, now: DateTime<Utc>) -> i64 {
        match *self {
            UpkeepPolicy::EveryTick => league_cost,
            UpkeepPolicy::Inactivity { period_ms } => {
                if period_ms <= 0 {
                    return 0;
                }
                let idle_ms = now.timestamp_millis() - updated_at_ms;
                if idle_ms <= period_ms {
                    return 0;
                }
                league_cost.saturating_mul(idle_ms / period_ms)
            }
        }
    }
}
