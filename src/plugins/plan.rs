//! Daily plans: execution truth.
//!
//! A plan is the record of what actually happened on a day. While open,
//! entries move freely between PENDING, COMPLETED, and MISSED; the moment
//! the day is closed the record is permanent. The closed check runs at
//! every mutation entry point rather than centrally; there is no path
//! around it.

use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::core::time;
use crate::interp::InterpContext;
use crate::interp::bus::{PublishReport, publish_fact};
use crate::interp::fact::{Fact, FactKind};
use crate::plugins::{task, user};
use chrono::{Datelike, NaiveDate, Weekday};
use clap::ValueEnum;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Completed,
    Missed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "PENDING",
            EntryStatus::Completed => "COMPLETED",
            EntryStatus::Missed => "MISSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TidelogError> {
        match s {
            "PENDING" => Ok(EntryStatus::Pending),
            "COMPLETED" => Ok(EntryStatus::Completed),
            "MISSED" => Ok(EntryStatus::Missed),
            _ => Err(TidelogError::ValidationError(format!(
                "unknown entry status: {}",
                s
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlanEntry {
    pub id: String,
    pub plan_id: String,
    pub task_id: String,
    pub status: EntryStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DailyPlan {
    pub id: String,
    pub user_id: String,
    pub day: NaiveDate,
    pub closed: bool,
    pub created_at: String,
    pub updated_at: String,
    pub entries: Vec<PlanEntry>,
}

// Guard at every mutation entry point: a closed plan is execution truth,
// and execution truth does not change.
fn require_open(p: &DailyPlan) -> Result<(), TidelogError> {
    if p.closed {
        return Err(TidelogError::DomainViolation(format!(
            "daily plan for {} on {} is closed",
            p.user_id, p.day
        )));
    }
    Ok(())
}

pub fn load_plan(
    conn: &Connection,
    user_id: &str,
    day: NaiveDate,
) -> Result<Option<DailyPlan>, TidelogError> {
    let header: Option<(String, String, String, i64, String, String)> = conn
        .query_row(
            "SELECT id, user_id, day, closed, created_at, updated_at
             FROM daily_plans WHERE user_id = ?1 AND day = ?2",
            params![user_id, time::format_day(day)],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?;
    let Some((id, user_id, day_raw, closed, created_at, updated_at)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, plan_id, task_id, status FROM plan_entries
         WHERE plan_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([&id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut entries = Vec::new();
    for row in rows {
        let (id, plan_id, task_id, status) = row?;
        entries.push(PlanEntry {
            id,
            plan_id,
            task_id,
            status: EntryStatus::parse(&status)?,
        });
    }

    Ok(Some(DailyPlan {
        id,
        user_id,
        day: time::parse_day(&day_raw).map_err(TidelogError::ValidationError)?,
        closed: closed != 0,
        created_at,
        updated_at,
        entries,
    }))
}

fn require_plan(
    conn: &Connection,
    user_id: &str,
    day: NaiveDate,
) -> Result<DailyPlan, TidelogError> {
    load_plan(conn, user_id, day)?
        .ok_or_else(|| TidelogError::NotFound(format!("daily plan for {} on {}", user_id, day)))
}

fn insert_entry(
    conn: &Connection,
    plan_id: &str,
    user_id: &str,
    task_id: &str,
) -> Result<(), TidelogError> {
    let t = task::require_task(conn, task_id)?;
    if t.user_id != user_id {
        return Err(TidelogError::ValidationError(format!(
            "task {} belongs to {}, not {}",
            task_id, t.user_id, user_id
        )));
    }
    conn.execute(
        "INSERT OR IGNORE INTO plan_entries(id, plan_id, task_id, status)
         VALUES(?1, ?2, ?3, 'PENDING')",
        params![format!("E_{}", Ulid::new()), plan_id, task_id],
    )?;
    Ok(())
}

/// Create the open plan for a user and day. One plan per (user, day).
pub fn plan_day(
    cx: &InterpContext,
    user_id: &str,
    day: NaiveDate,
    task_ids: &[String],
) -> Result<DailyPlan, TidelogError> {
    let id = format!("P_{}", Ulid::new());
    let at = cx.clock.stamp();
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "plan.day", |conn| {
        user::require_user(conn, user_id)?;
        if load_plan(conn, user_id, day)?.is_some() {
            return Err(TidelogError::ValidationError(format!(
                "{} already has a plan for {}; add entries to it instead",
                user_id, day
            )));
        }
        conn.execute(
            "INSERT INTO daily_plans(id, user_id, day, closed, created_at, updated_at)
             VALUES(?1, ?2, ?3, 0, ?4, ?4)",
            params![id, user_id, time::format_day(day), at],
        )?;
        for task_id in task_ids {
            insert_entry(conn, &id, user_id, task_id)?;
        }
        require_plan(conn, user_id, day)
    })
}

pub fn add_entry(
    cx: &InterpContext,
    user_id: &str,
    day: NaiveDate,
    task_id: &str,
) -> Result<DailyPlan, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "plan.entry.add", |conn| {
        let p = require_plan(conn, user_id, day)?;
        require_open(&p)?;
        if p.entries.iter().any(|e| e.task_id == task_id) {
            return Err(TidelogError::ValidationError(format!(
                "task {} is already planned for {}",
                task_id, day
            )));
        }
        insert_entry(conn, &p.id, user_id, task_id)?;
        touch(conn, &p.id, &cx.clock.stamp())?;
        require_plan(conn, user_id, day)
    })
}

pub fn complete_entry(
    cx: &InterpContext,
    user_id: &str,
    day: NaiveDate,
    task_id: &str,
) -> Result<DailyPlan, TidelogError> {
    resolve_entry(cx, user_id, day, task_id, EntryStatus::Completed)
}

pub fn miss_entry(
    cx: &InterpContext,
    user_id: &str,
    day: NaiveDate,
    task_id: &str,
) -> Result<DailyPlan, TidelogError> {
    resolve_entry(cx, user_id, day, task_id, EntryStatus::Missed)
}

// Entries resolve exactly once: PENDING -> COMPLETED or PENDING -> MISSED.
fn resolve_entry(
    cx: &InterpContext,
    user_id: &str,
    day: NaiveDate,
    task_id: &str,
    to: EntryStatus,
) -> Result<DailyPlan, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "plan.entry.resolve", |conn| {
        let p = require_plan(conn, user_id, day)?;
        require_open(&p)?;
        let entry = p
            .entries
            .iter()
            .find(|e| e.task_id == task_id)
            .ok_or_else(|| {
                TidelogError::NotFound(format!("no entry for task {} on {}", task_id, day))
            })?;
        if entry.status != EntryStatus::Pending {
            return Err(TidelogError::ValidationError(format!(
                "entry for task {} on {} is already {}",
                task_id,
                day,
                entry.status.as_str()
            )));
        }
        conn.execute(
            "UPDATE plan_entries SET status = ?1 WHERE id = ?2",
            params![to.as_str(), entry.id],
        )?;
        touch(conn, &p.id, &cx.clock.stamp())?;
        require_plan(conn, user_id, day)
    })
}

/// Close the day. One-way: there is no way back to open, and closing an
/// already-closed day is itself a violation.
pub fn close_day(
    cx: &InterpContext,
    user_id: &str,
    day: NaiveDate,
) -> Result<(DailyPlan, PublishReport), TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    let p = broker.with_conn(&cx.store.db_path(), &cx.config.actor, "plan.close", |conn| {
        let p = require_plan(conn, user_id, day)?;
        require_open(&p)?;
        conn.execute(
            "UPDATE daily_plans SET closed = 1, updated_at = ?1 WHERE id = ?2",
            params![cx.clock.stamp(), p.id],
        )?;
        require_plan(conn, user_id, day)
    })?;

    let fact = Fact::new(user_id, &cx.clock, FactKind::DayClosed { day });
    let report = publish_fact(cx, &fact);
    Ok((p, report))
}

pub fn get_plan(cx: &InterpContext, user_id: &str, day: NaiveDate) -> Result<DailyPlan, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "plan.get", |conn| {
        require_plan(conn, user_id, day)
    })
}

/// Record a reshuffle of the week's plan. The fact is consumed by the
/// audit side only; no derived state reacts to it.
pub fn update_week(
    cx: &InterpContext,
    user_id: &str,
    week_start: NaiveDate,
) -> Result<PublishReport, TidelogError> {
    if week_start.weekday() != Weekday::Mon {
        return Err(TidelogError::ValidationError(format!(
            "week starts on a Monday; {} is a {:?}",
            week_start,
            week_start.weekday()
        )));
    }
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "plan.week", |conn| {
        user::require_user(conn, user_id)?;
        Ok(())
    })?;

    let fact = Fact::new(user_id, &cx.clock, FactKind::WeeklyPlanUpdated { week_start });
    Ok(publish_fact(cx, &fact))
}

fn touch(conn: &Connection, plan_id: &str, at: &str) -> Result<(), TidelogError> {
    conn.execute(
        "UPDATE daily_plans SET updated_at = ?1 WHERE id = ?2",
        params![at, plan_id],
    )?;
    Ok(())
}
