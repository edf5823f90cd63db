//! Append-only audit trail over every published fact.
//!
//! Records land in the `audit_log` table and are mirrored to
//! `audit.events.jsonl`; neither is ever updated or deleted. A fact kind
//! missing from the mapping table is logged and receipted without a
//! record, so it is not redelivered forever; the gap is permanent once
//! logged.

use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::core::schemas;
use crate::core::time;
use crate::interp::InterpContext;
use crate::interp::bus::{ConsumerOutcome, FactConsumer};
use crate::interp::fact::Fact;
use crate::interp::ledger;
use colored::Colorize;
use rusqlite::{Connection, params, types::ToSql};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

pub const CONSUMER_NAME: &str = "AUDIT";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditRecord {
    pub id: String,
    pub fact_id: String,
    pub record_kind: String,
    pub user_id: String,
    pub ts: String,
    pub payload: JsonValue,
}

/// Closed mapping from fact kind to audit record kind.
///
/// `week.updated` has no mapping on purpose: weekly reshuffles are
/// receipted but produce no standalone audit record.
fn record_kinds() -> &'static FxHashMap<&'static str, &'static str> {
    static RECORD_KINDS: OnceLock<FxHashMap<&'static str, &'static str>> = OnceLock::new();
    RECORD_KINDS.get_or_init(|| {
        let mut kinds = FxHashMap::default();
        kinds.insert("task.created", "audit.task.created");
        kinds.insert("task.completed", "audit.task.completed");
        kinds.insert("day.closed", "audit.day.closed");
        kinds.insert("user.created", "audit.user.created");
        kinds
    })
}

pub struct AuditConsumer;

impl FactConsumer for AuditConsumer {
    fn name(&self) -> &'static str {
        CONSUMER_NAME
    }

    fn apply(&self, cx: &InterpContext, fact: &Fact) -> Result<ConsumerOutcome, TidelogError> {
        let broker = DbBroker::new(&cx.store.root);
        broker.with_conn(
            &cx.store.db_path(),
            &cx.config.actor,
            "interp.audit.append",
            |conn| {
                if ledger::has_processed(conn, &fact.fact_id, CONSUMER_NAME)? {
                    return Ok(ConsumerOutcome::AlreadyProcessed);
                }
                let at = cx.clock.stamp();
                match record_kinds().get(fact.kind.label()) {
                    Some(record_kind) => {
                        append_record(conn, &cx.store.root, fact, record_kind, &at)?;
                    }
                    None => {
                        eprintln!(
                            "{} no audit mapping for fact kind '{}' (fact {}); \
                             recording receipt only",
                            "warning:".bright_yellow().bold(),
                            fact.kind.label(),
                            fact.fact_id
                        );
                    }
                }
                ledger::mark_processed(conn, &fact.fact_id, CONSUMER_NAME, &at)?;
                Ok(ConsumerOutcome::Applied)
            },
        )
    }
}

fn append_record(
    conn: &Connection,
    root: &Path,
    fact: &Fact,
    record_kind: &str,
    at: &str,
) -> Result<(), TidelogError> {
    let record = AuditRecord {
        id: time::new_event_id(),
        fact_id: fact.fact_id.clone(),
        record_kind: record_kind.to_string(),
        user_id: fact.user_id.clone(),
        ts: at.to_string(),
        payload: serde_json::to_value(fact).unwrap(),
    };

    conn.execute(
        "INSERT INTO audit_log(id, fact_id, record_kind, user_id, ts, payload)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id,
            record.fact_id,
            record.record_kind,
            record.user_id,
            record.ts,
            serde_json::to_string(&record.payload).unwrap()
        ],
    )?;

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(root.join(schemas::AUDIT_EVENTS_NAME))
        .map_err(TidelogError::IoError)?;
    writeln!(f, "{}", serde_json::to_string(&record).unwrap())
        .map_err(TidelogError::IoError)?;
    Ok(())
}

/// Historical records, most recent first, optionally scoped to one user.
pub fn audit_records(
    conn: &Connection,
    user_id: Option<&str>,
    limit: usize,
) -> Result<Vec<AuditRecord>, TidelogError> {
    let mut query = "SELECT id, fact_id, record_kind, user_id, ts, payload
         FROM audit_log WHERE 1=1"
        .to_string();
    let mut sql_params: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(user) = user_id {
        query.push_str(" AND user_id = ?");
        sql_params.push(Box::new(user.to_string()));
    }
    query.push_str(" ORDER BY ts DESC, id DESC LIMIT ?");
    sql_params.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&query)?;
    let params_as_dyn: Vec<&dyn ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(&params_as_dyn[..], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, fact_id, record_kind, user_id, ts, payload) = row?;
        records.push(AuditRecord {
            id,
            fact_id,
            record_kind,
            user_id,
            ts,
            payload: serde_json::from_str(&payload).unwrap_or(JsonValue::Null),
        });
    }
    Ok(records)
}
