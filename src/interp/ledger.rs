//! Idempotency ledger: which consumer has already processed which fact.
//!
//! A receipt's absence is the only permission to act; its presence is a
//! permanent skip signal. The `(fact_id, consumer)` primary key plus
//! `INSERT OR IGNORE` make marking atomic, so redelivery races degrade to
//! benign no-ops instead of errors.

use crate::core::error::TidelogError;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProcessingReceipt {
    pub fact_id: String,
    pub consumer: String,
    pub processed_at: String,
}

pub fn has_processed(
    conn: &Connection,
    fact_id: &str,
    consumer: &str,
) -> Result<bool, TidelogError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT processed_at FROM processing_receipts WHERE fact_id = ?1 AND consumer = ?2",
            params![fact_id, consumer],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Record that `consumer` has finished acting on `fact_id`.
///
/// Returns whether the receipt was newly written; a duplicate mark is a
/// no-op, never an error.
pub fn mark_processed(
    conn: &Connection,
    fact_id: &str,
    consumer: &str,
    at: &str,
) -> Result<bool, TidelogError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO processing_receipts(fact_id, consumer, processed_at)
         VALUES(?1, ?2, ?3)",
        params![fact_id, consumer, at],
    )?;
    Ok(inserted > 0)
}

pub fn receipts_for_fact(
    conn: &Connection,
    fact_id: &str,
) -> Result<Vec<ProcessingReceipt>, TidelogError> {
    let mut stmt = conn.prepare(
        "SELECT fact_id, consumer, processed_at FROM processing_receipts
         WHERE fact_id = ?1 ORDER BY consumer",
    )?;
    let rows = stmt.query_map([fact_id], |row| {
        Ok(ProcessingReceipt {
            fact_id: row.get(0)?,
            consumer: row.get(1)?,
            processed_at: row.get(2)?,
        })
    })?;
    let mut receipts = Vec::new();
    for row in rows {
        receipts.push(row?);
    }
    Ok(receipts)
}
