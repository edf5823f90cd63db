//! Immutable facts about user activity.
//!
//! A fact is created once by the collaborator that committed the
//! originating mutation, and is never mutated or deleted afterwards.
//! Durability of the historical record is the audit consumer's job; the
//! fact value itself only lives for the publish call.

use crate::core::time::{self, Clock};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Fact {
    pub fact_id: String,
    pub user_id: String,
    pub occurred_at: String,
    #[serde(flatten)]
    pub kind: FactKind,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", content = "payload")]
pub enum FactKind {
    TaskCreated {
        task_id: String,
    },
    TaskCompleted {
        task_id: String,
        goal_id: Option<String>,
        key_result_id: Option<String>,
        contribution: f64,
    },
    DayClosed {
        day: NaiveDate,
    },
    WeeklyPlanUpdated {
        week_start: NaiveDate,
    },
    UserCreated {
        name: String,
    },
}

impl Fact {
    pub fn new(user_id: &str, clock: &Clock, kind: FactKind) -> Self {
        Self {
            fact_id: time::new_event_id(),
            user_id: user_id.to_string(),
            occurred_at: clock.stamp(),
            kind,
        }
    }
}

impl FactKind {
    /// Stable label used for audit mapping and event envelopes.
    pub fn label(&self) -> &'static str {
        match self {
            FactKind::TaskCreated { .. } => "task.created",
            FactKind::TaskCompleted { .. } => "task.completed",
            FactKind::DayClosed { .. } => "day.closed",
            FactKind::WeeklyPlanUpdated { .. } => "week.updated",
            FactKind::UserCreated { .. } => "user.created",
        }
    }
}
