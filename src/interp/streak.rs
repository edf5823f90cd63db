//! Streak derivation from day closures.
//!
//! `streaks` is derived interpretation, never an editable record: the
//! only writer is this consumer.

use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::interp::InterpContext;
use crate::interp::bus::{ConsumerOutcome, FactConsumer};
use crate::interp::fact::{Fact, FactKind};
use crate::interp::ledger;
use crate::plugins::plan::{self, EntryStatus};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

pub const CONSUMER_NAME: &str = "STREAK";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StreakState {
    pub user_id: String,
    pub current_streak: i64,
    pub updated_at: String,
}

pub struct StreakConsumer;

impl FactConsumer for StreakConsumer {
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
            "interp.streak.update",
            |conn| {
                if ledger::has_processed(conn, &fact.fact_id, CONSUMER_NAME)? {
                    return Ok(ConsumerOutcome::AlreadyProcessed);
                }
                let p = plan::load_plan(conn, &fact.user_id, day)?.ok_or_else(|| {
                    TidelogError::NotFound(format!("daily plan for {} on {}", fact.user_id, day))
                })?;

                let total = p.entries.len();
                let completed = p
                    .entries
                    .iter()
                    .filter(|e| e.status == EntryStatus::Completed)
                    .count();

                // An empty plan does not keep a streak alive: zero planned
                // entries resets, the same as a missed day.
                let next = if total > 0 && completed == total {
                    current_streak(conn, &fact.user_id)? + 1
                } else {
                    0
                };

                let at = cx.clock.stamp();
                conn.execute(
                    "INSERT INTO streaks(user_id, current_streak, updated_at)
                     VALUES(?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET
                         current_streak = excluded.current_streak,
                         updated_at = excluded.updated_at",
                    params![fact.user_id, next, at],
                )?;
                ledger::mark_processed(conn, &fact.fact_id, CONSUMER_NAME, &at)?;
                Ok(ConsumerOutcome::Applied)
            },
        )
    }
}

pub fn get_streak(conn: &Connection, user_id: &str) -> Result<Option<StreakState>, TidelogError> {
    let state = conn
        .query_row(
            "SELECT user_id, current_streak, updated_at FROM streaks WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok(StreakState {
                    user_id: row.get(0)?,
                    current_streak: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}

/// A user with no streak row has a streak of zero.
pub fn current_streak(conn: &Connection, user_id: &str) -> Result<i64, TidelogError> {
    Ok(get_streak(conn, user_id)?.map(|s| s.current_streak).unwrap_or(0))
}
