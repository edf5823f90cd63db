//! Goal snapshots and trend.
//!
//! A snapshot is a permanent, dated record of a goal's actual vs.
//! expected progress. Rows are appended on day closure and never updated
//! or deleted, even where re-derivation would be possible; the history is
//! the time series trend is computed over. Trend itself is computed on
//! read and never stored.

use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::core::time;
use crate::interp::InterpContext;
use crate::interp::bus::{ConsumerOutcome, FactConsumer};
use crate::interp::fact::{Fact, FactKind};
use crate::interp::ledger;
use crate::plugins::goal::{self, Goal};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

pub const CONSUMER_NAME: &str = "SNAPSHOT";

/// Progress movement smaller than this reads as noise, not direction.
pub const TREND_DEADBAND: f64 = 0.02;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GoalSnapshot {
    pub id: String,
    pub goal_id: String,
    pub snap_date: NaiveDate,
    pub actual: f64,
    pub expected: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Up,
    Flat,
    Down,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "UP",
            Trend::Flat => "FLAT",
            Trend::Down => "DOWN",
        }
    }
}

pub struct SnapshotConsumer;

impl FactConsumer for SnapshotConsumer {
    fn name(&self) -> &'static str {
        CONSUMER_NAME
    }

    fn apply(&self, cx: &InterpContext, fact: &Fact) -> Result<ConsumerOutcome, TidelogError> {
        let FactKind::DayClosed { day } = fact.kind else {
            return Ok(ConsumerOutcome::NotApplicable);
        };

        let broker = DbBroker::new(&cx.store.root);
        broker.with_conn(
            &cx.store.db_path(),
            &cx.config.actor,
            "interp.snapshot.append",
            |conn| {
                if ledger::has_processed(conn, &fact.fact_id, CONSUMER_NAME)? {
                    return Ok(ConsumerOutcome::AlreadyProcessed);
                }
                let at = cx.clock.stamp();
                for g in goal::active_goals_for_user(conn, &fact.user_id)? {
                    append_snapshot(conn, &g, day, &at)?;
                }
                ledger::mark_processed(conn, &fact.fact_id, CONSUMER_NAME, &at)?;
                Ok(ConsumerOutcome::Applied)
            },
        )
    }
}

fn append_snapshot(
    conn: &Connection,
    g: &Goal,
    day: NaiveDate,
    at: &str,
) -> Result<(), TidelogError> {
    let krs = goal::key_results_for_goal(conn, &g.id)?;
    let actual = if krs.is_empty() {
        0.0
    } else {
        krs.iter().map(|kr| kr.progress()).sum::<f64>() / krs.len() as f64
    };
    let expected = expected_progress(g, day);

    conn.execute(
        "INSERT INTO goal_snapshots(id, goal_id, snap_date, actual, expected, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            time::new_event_id(),
            g.id,
            time::format_day(day),
            actual,
            expected,
            at
        ],
    )?;
    Ok(())
}

/// Fraction of the goal window elapsed at `day`, clamped to [0, 1].
///
/// Days before the window read 0, days after it read 1; a degenerate
/// zero-length window collapses to 0/1 around its start date.
pub fn expected_progress(g: &Goal, day: NaiveDate) -> f64 {
    if day < g.start_date {
        return 0.0;
    }
    if day > g.end_date {
        return 1.0;
    }
    let span = (g.end_date - g.start_date).num_days();
    if span <= 0 {
        return 1.0;
    }
    let elapsed = (day - g.start_date).num_days();
    (elapsed as f64 / span as f64).clamp(0.0, 1.0)
}

/// Direction of movement over `history`, ordered most-recent-first.
///
/// Total over every input: empty and singleton histories are FLAT, and a
/// window larger than the history falls back to the oldest snapshot.
pub fn trend(history: &[GoalSnapshot], window: usize) -> Trend {
    if history.is_empty() {
        return Trend::Flat;
    }
    let previous = window.saturating_sub(1).min(history.len() - 1);
    if previous == 0 {
        return Trend::Flat;
    }
    let delta = history[0].actual - history[previous].actual;
    if delta > TREND_DEADBAND {
        Trend::Up
    } else if delta < -TREND_DEADBAND {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// Snapshot history for a goal, most recent first.
pub fn snapshot_history(
    conn: &Connection,
    goal_id: &str,
) -> Result<Vec<GoalSnapshot>, TidelogError> {
    let mut stmt = conn.prepare(
        "SELECT id, goal_id, snap_date, actual, expected, created_at
         FROM goal_snapshots WHERE goal_id = ?1
         ORDER BY snap_date DESC, created_at DESC",
    )?;
    let rows = stmt.query_map([goal_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;
    let mut history = Vec::new();
    for row in rows {
        let (id, goal_id, snap_date, actual, expected, created_at) = row?;
        history.push(GoalSnapshot {
            id,
            goal_id,
            snap_date: time::parse_day(&snap_date).map_err(TidelogError::ValidationError)?,
            actual,
            expected,
            created_at,
        });
    }
    Ok(history)
}

pub fn goal_trend(conn: &Connection, goal_id: &str, window: usize) -> Result<Trend, TidelogError> {
    Ok(trend(&snapshot_history(conn, goal_id)?, window))
}
