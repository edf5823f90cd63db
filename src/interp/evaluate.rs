//! Goal evaluation: the only write path to a key result's current value.
//!
//! Progress is derived, not declared. User-facing edit paths can touch a
//! key result's title, target, and weight, but `current_value` moves only
//! through the strategies in this module, in reaction to facts.

use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::interp::InterpContext;
use crate::interp::bus::{ConsumerOutcome, FactConsumer};
use crate::interp::fact::{Fact, FactKind};
use crate::interp::ledger;
use crate::plugins::goal::{self, Goal, KeyResult, KeyResultKind};
use crate::plugins::plan;
use colored::Colorize;
use rusqlite::{Connection, params};

pub const CONSUMER_NAME: &str = "GOAL";

pub struct GoalConsumer;

impl FactConsumer for GoalConsumer {
    fn name(&self) -> &'static str {
        CONSUMER_NAME
    }

    fn apply(&self, cx: &InterpContext, fact: &Fact) -> Result<ConsumerOutcome, TidelogError> {
        // Only task completions and day closures can move a key result.
        if !matches!(
            fact.kind,
            FactKind::TaskCompleted { .. } | FactKind::DayClosed { .. }
        ) {
            return Ok(ConsumerOutcome::NotApplicable);
        }

        let broker = DbBroker::new(&cx.store.root);
        broker.with_conn(
            &cx.store.db_path(),
            &cx.config.actor,
            "interp.goal.evaluate",
            |conn| {
                if ledger::has_processed(conn, &fact.fact_id, CONSUMER_NAME)? {
                    return Ok(ConsumerOutcome::AlreadyProcessed);
                }
                let at = cx.clock.stamp();
                for g in goal::goals_for_user(conn, &fact.user_id)? {
                    evaluate_goal(conn, &g, fact, &at)?;
                }
                ledger::mark_processed(conn, &fact.fact_id, CONSUMER_NAME, &at)?;
                Ok(ConsumerOutcome::Applied)
            },
        )
    }
}

fn evaluate_goal(
    conn: &Connection,
    g: &Goal,
    fact: &Fact,
    at: &str,
) -> Result<(), TidelogError> {
    // Defense in depth: a key result must never be evaluated against a
    // fact from another user. Tripping this means the data itself is
    // wrong, not the request.
    if g.user_id != fact.user_id {
        let msg = format!(
            "goal {} belongs to {}, fact {} was raised by {}",
            g.id, g.user_id, fact.fact_id, fact.user_id
        );
        eprintln!("{} {}", "integrity:".bright_red().bold(), msg);
        return Err(TidelogError::Authorization(msg));
    }

    for kr in goal::key_results_for_goal(conn, &g.id)? {
        if let Some(next) = evaluate(conn, &kr, fact)? {
            set_current_value(conn, &kr.id, next, at)?;
        }
    }
    Ok(())
}

/// Single dispatch point over key-result kinds. The match keeps the set
/// of strategies exhaustive at compile time; adding a kind without a
/// strategy will not build.
fn evaluate(
    conn: &Connection,
    kr: &KeyResult,
    fact: &Fact,
) -> Result<Option<f64>, TidelogError> {
    match kr.kind {
        KeyResultKind::Accumulative => eval_accumulative(kr, fact),
        KeyResultKind::Habit => eval_habit(conn, kr, fact),
        KeyResultKind::Milestone => eval_milestone(kr, fact),
    }
}

/// A completed task that references this key result adds its contribution.
fn eval_accumulative(kr: &KeyResult, fact: &Fact) -> Result<Option<f64>, TidelogError> {
    if let FactKind::TaskCompleted {
        key_result_id: Some(kr_id),
        contribution,
        ..
    } = &fact.kind
        && kr_id == &kr.id
    {
        return Ok(Some(kr.current_value + contribution));
    }
    Ok(None)
}

/// A closed day with at least one completed entry linked to this key
/// result adds exactly 1.0: once per day, however many qualifying tasks
/// were completed.
fn eval_habit(
    conn: &Connection,
    kr: &KeyResult,
    fact: &Fact,
) -> Result<Option<f64>, TidelogError> {
    let FactKind::DayClosed { day } = &fact.kind else {
        return Ok(None);
    };
    let p = plan::load_plan(conn, &fact.user_id, *day)?.ok_or_else(|| {
        TidelogError::NotFound(format!("daily plan for {} on {}", fact.user_id, day))
    })?;
    let qualifying: i64 = conn.query_row(
        "SELECT COUNT(*) FROM plan_entries pe
         JOIN tasks t ON t.id = pe.task_id
         WHERE pe.plan_id = ?1 AND pe.status = 'COMPLETED' AND t.key_result_id = ?2",
        params![p.id, kr.id],
        |row| row.get(0),
    )?;
    if qualifying > 0 {
        Ok(Some(kr.current_value + 1.0))
    } else {
        Ok(None)
    }
}

/// Binary: a completed task referencing this key result snaps it to its
/// target. Re-application converges on the same value.
fn eval_milestone(kr: &KeyResult, fact: &Fact) -> Result<Option<f64>, TidelogError> {
    if let FactKind::TaskCompleted {
        key_result_id: Some(kr_id),
        ..
    } = &fact.kind
        && kr_id == &kr.id
    {
        return Ok(Some(kr.target_value));
    }
    Ok(None)
}

/// Explicit manual completion of a milestone key result.
///
/// Lives here rather than in the goal collaborator so that even manual
/// completion flows through the evaluation module's write path.
pub fn complete_milestone(cx: &InterpContext, kr_id: &str) -> Result<KeyResult, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(
        &cx.store.db_path(),
        &cx.config.actor,
        "interp.goal.milestone",
        |conn| {
            let kr = goal::get_key_result(conn, kr_id)?
                .ok_or_else(|| TidelogError::NotFound(format!("key result {}", kr_id)))?;
            if kr.kind != KeyResultKind::Milestone {
                return Err(TidelogError::ValidationError(format!(
                    "key result {} is {}, not a milestone",
                    kr_id,
                    kr.kind.as_str()
                )));
            }
            set_current_value(conn, &kr.id, kr.target_value, &cx.clock.stamp())?;
            goal::get_key_result(conn, kr_id)?
                .ok_or_else(|| TidelogError::NotFound(format!("key result {}", kr_id)))
        },
    )
}

// The only UPDATE against key_results.current_value in the crate.
fn set_current_value(
    conn: &Connection,
    kr_id: &str,
    value: f64,
    at: &str,
) -> Result<(), TidelogError> {
    conn.execute(
        "UPDATE key_results SET current_value = ?1, updated_at = ?2 WHERE id = ?3",
        params![value, at, kr_id],
    )?;
    Ok(())
}
