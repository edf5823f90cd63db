//! Goals and key results: the intent side of the ledger.
//!
//! Edits here are free-form user intent: titles, targets, status. The
//! one thing no path in this module can touch is a key result's
//! `current_value`; that column belongs to `crate::interp::evaluate`.

use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::core::time;
use crate::interp::InterpContext;
use crate::interp::snapshot::{self, GoalSnapshot, Trend};
use crate::plugins::user;
use chrono::NaiveDate;
use clap::ValueEnum;
use rusqlite::{Connection, OptionalExtension, params, types::ToSql};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Horizon {
    Month,
    Quarter,
    Year,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Month => "MONTH",
            Horizon::Quarter => "QUARTER",
            Horizon::Year => "YEAR",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TidelogError> {
        match s {
            "MONTH" => Ok(Horizon::Month),
            "QUARTER" => Ok(Horizon::Quarter),
            "YEAR" => Ok(Horizon::Year),
            _ => Err(TidelogError::ValidationError(format!(
                "unknown horizon: {}",
                s
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    Active,
    Completed,
    Archived,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "ACTIVE",
            GoalStatus::Completed => "COMPLETED",
            GoalStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TidelogError> {
        match s {
            "ACTIVE" => Ok(GoalStatus::Active),
            "COMPLETED" => Ok(GoalStatus::Completed),
            "ARCHIVED" => Ok(GoalStatus::Archived),
            _ => Err(TidelogError::ValidationError(format!(
                "unknown goal status: {}",
                s
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyResultKind {
    Accumulative,
    Habit,
    Milestone,
}

impl KeyResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyResultKind::Accumulative => "ACCUMULATIVE",
            KeyResultKind::Habit => "HABIT",
            KeyResultKind::Milestone => "MILESTONE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TidelogError> {
        match s {
            "ACCUMULATIVE" => Ok(KeyResultKind::Accumulative),
            "HABIT" => Ok(KeyResultKind::Habit),
            "MILESTONE" => Ok(KeyResultKind::Milestone),
            _ => Err(TidelogError::ValidationError(format!(
                "unknown key result kind: {}",
                s
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub horizon: Horizon,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: GoalStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeyResult {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    pub kind: KeyResultKind,
    pub start_value: f64,
    pub target_value: f64,
    pub current_value: f64,
    pub weight: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl KeyResult {
    /// `current_value / target_value`, guarding a zero target.
    pub fn progress(&self) -> f64 {
        if self.target_value == 0.0 {
            0.0
        } else {
            self.current_value / self.target_value
        }
    }
}

/// Everything a dashboard needs about one goal.
#[derive(Serialize, Debug, Clone)]
pub struct GoalReport {
    pub goal: Goal,
    pub key_results: Vec<KeyResult>,
    pub progress: f64,
    pub trend: Trend,
}

const GOAL_COLUMNS: &str =
    "id, user_id, title, horizon, start_date, end_date, status, created_at, updated_at";

type GoalRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn goal_from_row(row: GoalRow) -> Result<Goal, TidelogError> {
    let (id, user_id, title, horizon, start_date, end_date, status, created_at, updated_at) = row;
    Ok(Goal {
        id,
        user_id,
        title,
        horizon: Horizon::parse(&horizon)?,
        start_date: time::parse_day(&start_date).map_err(TidelogError::ValidationError)?,
        end_date: time::parse_day(&end_date).map_err(TidelogError::ValidationError)?,
        status: GoalStatus::parse(&status)?,
        created_at,
        updated_at,
    })
}

fn query_goals(
    conn: &Connection,
    where_clause: &str,
    sql_params: &[&dyn ToSql],
) -> Result<Vec<Goal>, TidelogError> {
    let query = format!(
        "SELECT {} FROM goals WHERE {} ORDER BY created_at",
        GOAL_COLUMNS, where_clause
    );
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map(sql_params, |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ))
    })?;
    let mut goals = Vec::new();
    for row in rows {
        goals.push(goal_from_row(row?)?);
    }
    Ok(goals)
}

pub fn goals_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Goal>, TidelogError> {
    query_goals(conn, "user_id = ?1", &[&user_id])
}

pub fn active_goals_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Goal>, TidelogError> {
    query_goals(conn, "user_id = ?1 AND status = 'ACTIVE'", &[&user_id])
}

pub fn get_goal(conn: &Connection, goal_id: &str) -> Result<Option<Goal>, TidelogError> {
    let goals = query_goals(conn, "id = ?1", &[&goal_id])?;
    Ok(goals.into_iter().next())
}

pub fn require_goal(conn: &Connection, goal_id: &str) -> Result<Goal, TidelogError> {
    get_goal(conn, goal_id)?.ok_or_else(|| TidelogError::NotFound(format!("goal {}", goal_id)))
}

pub fn key_results_for_goal(
    conn: &Connection,
    goal_id: &str,
) -> Result<Vec<KeyResult>, TidelogError> {
    let mut stmt = conn.prepare(
        "SELECT id, goal_id, title, kind, start_value, target_value, current_value, weight,
                created_at, updated_at
         FROM key_results WHERE goal_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map([goal_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, f64>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;
    let mut krs = Vec::new();
    for row in rows {
        let (id, goal_id, title, kind, start_value, target_value, current_value, weight, created_at, updated_at) =
            row?;
        krs.push(KeyResult {
            id,
            goal_id,
            title,
            kind: KeyResultKind::parse(&kind)?,
            start_value,
            target_value,
            current_value,
            weight,
            created_at,
            updated_at,
        });
    }
    Ok(krs)
}

pub fn get_key_result(conn: &Connection, kr_id: &str) -> Result<Option<KeyResult>, TidelogError> {
    let goal_id: Option<String> = conn
        .query_row(
            "SELECT goal_id FROM key_results WHERE id = ?1",
            [kr_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(goal_id) = goal_id else {
        return Ok(None);
    };
    Ok(key_results_for_goal(conn, &goal_id)?
        .into_iter()
        .find(|kr| kr.id == kr_id))
}

pub fn add_goal(
    cx: &InterpContext,
    user_id: &str,
    title: &str,
    horizon: Horizon,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Goal, TidelogError> {
    if end_date < start_date {
        return Err(TidelogError::ValidationError(format!(
            "goal window ends ({}) before it starts ({})",
            end_date, start_date
        )));
    }

    let id = format!("G_{}", Ulid::new());
    let at = cx.clock.stamp();
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.add", |conn| {
        user::require_user(conn, user_id)?;
        conn.execute(
            "INSERT INTO goals(id, user_id, title, horizon, start_date, end_date, status,
                               created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, 'ACTIVE', ?7, ?7)",
            params![
                id,
                user_id,
                title,
                horizon.as_str(),
                time::format_day(start_date),
                time::format_day(end_date),
                at
            ],
        )?;
        require_goal(conn, &id)
    })
}

#[allow(clippy::too_many_arguments)]
pub fn add_key_result(
    cx: &InterpContext,
    goal_id: &str,
    title: &str,
    kind: KeyResultKind,
    start_value: f64,
    target_value: f64,
    weight: f64,
) -> Result<KeyResult, TidelogError> {
    if weight <= 0.0 {
        return Err(TidelogError::ValidationError(format!(
            "key result weight must be positive, got {}",
            weight
        )));
    }

    let id = format!("KR_{}", Ulid::new());
    let at = cx.clock.stamp();
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.kr.add", |conn| {
        require_goal(conn, goal_id)?;
        conn.execute(
            "INSERT INTO key_results(id, goal_id, title, kind, start_value, target_value,
                                     current_value, weight, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?5, ?7, ?8, ?8)",
            params![
                id,
                goal_id,
                title,
                kind.as_str(),
                start_value,
                target_value,
                weight,
                at
            ],
        )?;
        get_key_result(conn, &id)?
            .ok_or_else(|| TidelogError::NotFound(format!("key result {}", id)))
    })
}

/// Edit user-declared fields of a key result. `current_value` is absent
/// here by design: meaning is derived, not declared.
pub fn edit_key_result(
    cx: &InterpContext,
    kr_id: &str,
    title: Option<String>,
    target_value: Option<f64>,
    weight: Option<f64>,
) -> Result<KeyResult, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.kr.edit", |conn| {
        get_key_result(conn, kr_id)?
            .ok_or_else(|| TidelogError::NotFound(format!("key result {}", kr_id)))?;

        let mut set_clauses = Vec::new();
        let mut sql_params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(t) = title {
            set_clauses.push("title = ?");
            sql_params.push(Box::new(t));
        }
        if let Some(tv) = target_value {
            set_clauses.push("target_value = ?");
            sql_params.push(Box::new(tv));
        }
        if let Some(w) = weight {
            if w <= 0.0 {
                return Err(TidelogError::ValidationError(format!(
                    "key result weight must be positive, got {}",
                    w
                )));
            }
            set_clauses.push("weight = ?");
            sql_params.push(Box::new(w));
        }
        if set_clauses.is_empty() {
            return get_key_result(conn, kr_id)?
                .ok_or_else(|| TidelogError::NotFound(format!("key result {}", kr_id)));
        }

        set_clauses.push("updated_at = ?");
        sql_params.push(Box::new(cx.clock.stamp()));
        sql_params.push(Box::new(kr_id.to_string()));

        let update_sql = format!(
            "UPDATE key_results SET {} WHERE id = ?",
            set_clauses.join(", ")
        );
        let params_as_dyn: Vec<&dyn ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&update_sql, &params_as_dyn[..])?;

        get_key_result(conn, kr_id)?
            .ok_or_else(|| TidelogError::NotFound(format!("key result {}", kr_id)))
    })
}

pub fn set_goal_status(
    cx: &InterpContext,
    goal_id: &str,
    status: GoalStatus,
) -> Result<Goal, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.status", |conn| {
        require_goal(conn, goal_id)?;
        conn.execute(
            "UPDATE goals SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), cx.clock.stamp(), goal_id],
        )?;
        require_goal(conn, goal_id)
    })
}

pub fn list_goals(cx: &InterpContext, user_id: &str) -> Result<Vec<Goal>, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.list", |conn| {
        user::require_user(conn, user_id)?;
        goals_for_user(conn, user_id)
    })
}

/// Weight-aware progress for display surfaces. Day-closure snapshots use
/// the plain average over key results instead; see `interp::snapshot`.
pub fn weighted_progress(conn: &Connection, goal_id: &str) -> Result<f64, TidelogError> {
    let krs = key_results_for_goal(conn, goal_id)?;
    let total_weight: f64 = krs.iter().map(|kr| kr.weight).sum();
    if krs.is_empty() || total_weight == 0.0 {
        return Ok(0.0);
    }
    Ok(krs.iter().map(|kr| kr.progress() * kr.weight).sum::<f64>() / total_weight)
}

pub fn goal_report(cx: &InterpContext, goal_id: &str) -> Result<GoalReport, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.report", |conn| {
        let goal = require_goal(conn, goal_id)?;
        let key_results = key_results_for_goal(conn, goal_id)?;
        let progress = weighted_progress(conn, goal_id)?;
        let trend = snapshot::goal_trend(conn, goal_id, cx.config.trend_window)?;
        Ok(GoalReport {
            goal,
            key_results,
            progress,
            trend,
        })
    })
}

pub fn snapshots(cx: &InterpContext, goal_id: &str) -> Result<Vec<GoalSnapshot>, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "goal.snapshots", |conn| {
        require_goal(conn, goal_id)?;
        snapshot::snapshot_history(conn, goal_id)
    })
}
