//! Shared timestamp/date helpers for deterministic envelopes.
//!
//! All wall-clock reads go through [`Clock`], which is always evaluated in
//! UTC, never the host machine's local zone, so that "today" means the
//! same thing no matter where the binary runs.

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

pub fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DAY_FORMAT)
        .map_err(|e| format!("invalid day '{}': {} (expected YYYY-MM-DD)", s, e))
}

/// Clock capability handed to the interpretation core.
///
/// Receipts and snapshots are stamped through this, so tests can freeze
/// time instead of racing the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    frozen: Option<(i64, NaiveDate)>,
}

impl Clock {
    pub fn system() -> Self {
        Self { frozen: None }
    }

    /// A clock pinned to the given epoch second and civil date.
    pub fn fixed(epoch_secs: i64, today: NaiveDate) -> Self {
        Self {
            frozen: Some((epoch_secs, today)),
        }
    }

    pub fn now_secs(&self) -> i64 {
        match self.frozen {
            Some((secs, _)) => secs,
            None => Utc::now().timestamp(),
        }
    }

    /// Epoch-second stamp with `Z` suffix, matching event envelopes.
    pub fn stamp(&self) -> String {
        format!("{}Z", self.now_secs())
    }

    pub fn today(&self) -> NaiveDate {
        match self.frozen {
            Some((_, day)) => day,
            None => Utc::now().date_naive(),
        }
    }
}
