use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::interp::InterpContext;
use crate::interp::bus::{PublishReport, publish_fact};
use crate::interp::fact::{Fact, FactKind};
use crate::plugins::{goal, user};
use clap::ValueEnum;
use rusqlite::{Connection, OptionalExtension, params, types::ToSql};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Open,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "OPEN",
            TaskStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TidelogError> {
        match s {
            "OPEN" => Ok(TaskStatus::Open),
            "COMPLETED" => Ok(TaskStatus::Completed),
            _ => Err(TidelogError::ValidationError(format!(
                "unknown task status: {}",
                s
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub goal_id: Option<String>,
    pub key_result_id: Option<String>,
    pub contribution: f64,
    pub status: TaskStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
}

const TASK_COLUMNS: &str =
    "id, user_id, title, goal_id, key_result_id, contribution, status, created_at, completed_at";

type TaskRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    f64,
    String,
    String,
    Option<String>,
);

fn task_from_row(row: TaskRow) -> Result<Task, TidelogError> {
    let (id, user_id, title, goal_id, key_result_id, contribution, status, created_at, completed_at) =
        row;
    Ok(Task {
        id,
        user_id,
        title,
        goal_id,
        key_result_id,
        contribution,
        status: TaskStatus::parse(&status)?,
        created_at,
        completed_at,
    })
}

fn query_tasks(
    conn: &Connection,
    where_clause: &str,
    sql_params: &[&dyn ToSql],
) -> Result<Vec<Task>, TidelogError> {
    let query = format!(
        "SELECT {} FROM tasks WHERE {} ORDER BY created_at",
        TASK_COLUMNS, where_clause
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
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(task_from_row(row?)?);
    }
    Ok(tasks)
}

pub fn get_task(conn: &Connection, task_id: &str) -> Result<Option<Task>, TidelogError> {
    Ok(query_tasks(conn, "id = ?1", &[&task_id])?.into_iter().next())
}

pub fn require_task(conn: &Connection, task_id: &str) -> Result<Task, TidelogError> {
    get_task(conn, task_id)?.ok_or_else(|| TidelogError::NotFound(format!("task {}", task_id)))
}

pub fn add_task(
    cx: &InterpContext,
    user_id: &str,
    title: &str,
    goal_id: Option<&str>,
    key_result_id: Option<&str>,
    contribution: f64,
) -> Result<(Task, PublishReport), TidelogError> {
    let id = format!("T_{}", Ulid::new());
    let at = cx.clock.stamp();
    let broker = DbBroker::new(&cx.store.root);
    let task = broker.with_conn(&cx.store.db_path(), &cx.config.actor, "task.add", |conn| {
        user::require_user(conn, user_id)?;

        // A task may name a key result directly; the goal link follows
        // from it and must not contradict an explicit --goal.
        let mut resolved_goal = goal_id.map(|g| g.to_string());
        if let Some(kr_id) = key_result_id {
            let kr = goal::get_key_result(conn, kr_id)?
                .ok_or_else(|| TidelogError::NotFound(format!("key result {}", kr_id)))?;
            match &resolved_goal {
                Some(g) if *g != kr.goal_id => {
                    return Err(TidelogError::ValidationError(format!(
                        "key result {} belongs to goal {}, not {}",
                        kr_id, kr.goal_id, g
                    )));
                }
                _ => resolved_goal = Some(kr.goal_id.clone()),
            }
        }
        if let Some(g) = &resolved_goal {
            goal::require_goal(conn, g)?;
        }

        conn.execute(
            "INSERT INTO tasks(id, user_id, title, goal_id, key_result_id, contribution,
                               status, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, 'OPEN', ?7)",
            params![id, user_id, title, resolved_goal, key_result_id, contribution, at],
        )?;
        require_task(conn, &id)
    })?;

    let fact = Fact::new(
        user_id,
        &cx.clock,
        FactKind::TaskCreated {
            task_id: task.id.clone(),
        },
    );
    let report = publish_fact(cx, &fact);
    Ok((task, report))
}

/// Mark a task completed and publish the completion fact.
///
/// Completions are single-shot: a second attempt is rejected rather than
/// republished, so an accumulative contribution can never be counted
/// twice from this path.
pub fn complete_task(
    cx: &InterpContext,
    task_id: &str,
) -> Result<(Task, PublishReport), TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    let task = broker.with_conn(&cx.store.db_path(), &cx.config.actor, "task.complete", |conn| {
        let task = require_task(conn, task_id)?;
        if task.status == TaskStatus::Completed {
            return Err(TidelogError::ValidationError(format!(
                "task {} is already completed",
                task_id
            )));
        }
        conn.execute(
            "UPDATE tasks SET status = 'COMPLETED', completed_at = ?1 WHERE id = ?2",
            params![cx.clock.stamp(), task_id],
        )?;
        require_task(conn, task_id)
    })?;

    let fact = Fact::new(
        &task.user_id,
        &cx.clock,
        FactKind::TaskCompleted {
            task_id: task.id.clone(),
            goal_id: task.goal_id.clone(),
            key_result_id: task.key_result_id.clone(),
            contribution: task.contribution,
        },
    );
    let report = publish_fact(cx, &fact);
    Ok((task, report))
}

pub fn list_tasks(
    cx: &InterpContext,
    user_id: &str,
    status: Option<TaskStatus>,
) -> Result<Vec<Task>, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "task.list", |conn| {
        user::require_user(conn, user_id)?;
        match status {
            Some(s) => query_tasks(conn, "user_id = ?1 AND status = ?2", &[&user_id, &s.as_str()]),
            None => query_tasks(conn, "user_id = ?1", &[&user_id]),
        }
    })
}
