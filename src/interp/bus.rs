//! In-process fact bus: synchronous fan-out with per-consumer isolation.

use crate::core::error::TidelogError;
use crate::interp::InterpContext;
use crate::interp::audit::AuditConsumer;
use crate::interp::evaluate::GoalConsumer;
use crate::interp::fact::Fact;
use crate::interp::snapshot::SnapshotConsumer;
use crate::interp::streak::StreakConsumer;
use colored::Colorize;
use serde::Serialize;

/// What one consumer did with one fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConsumerOutcome {
    /// Domain work performed and receipt written.
    Applied,
    /// Receipt already present; no side effects.
    AlreadyProcessed,
    /// Fact kind is not one this consumer reacts to.
    NotApplicable,
}

/// A component that reacts to facts to update derived state.
///
/// The name is the consumer's stable identity in the idempotency ledger:
/// renaming a consumer makes it reprocess history, so treat names as
/// permanent.
pub trait FactConsumer {
    fn name(&self) -> &'static str;
    fn apply(&self, cx: &InterpContext, fact: &Fact) -> Result<ConsumerOutcome, TidelogError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeliveryStatus {
    Applied,
    AlreadyProcessed,
    NotApplicable,
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub consumer: &'static str,
    pub status: DeliveryStatus,
}

/// Per-consumer outcomes of a single publish call.
///
/// The bus never decides whether a failed delivery is fatal; the
/// publishing collaborator reads the report and makes that call.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub fact_id: String,
    pub deliveries: Vec<Delivery>,
}

impl PublishReport {
    pub fn failures(&self) -> Vec<&Delivery> {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.status, DeliveryStatus::Failed { .. }))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures().is_empty()
    }
}

pub struct FactBus {
    consumers: Vec<Box<dyn FactConsumer>>,
}

impl FactBus {
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
        }
    }

    /// The full interpretation pipeline: goal evaluation, streaks,
    /// snapshots, audit.
    pub fn standard() -> Self {
        let mut bus = Self::new();
        bus.register(Box::new(GoalConsumer));
        bus.register(Box::new(StreakConsumer));
        bus.register(Box::new(SnapshotConsumer));
        bus.register(Box::new(AuditConsumer));
        bus
    }

    pub fn register(&mut self, consumer: Box<dyn FactConsumer>) {
        self.consumers.push(consumer);
    }

    /// Deliver `fact` to every registered consumer, one at a time, in
    /// registration order. Order is not semantically significant:
    /// consumers are order-independent and self-guard via the ledger.
    /// A consumer error is caught and reported; it never prevents the
    /// remaining consumers from running.
    pub fn publish(&self, cx: &InterpContext, fact: &Fact) -> PublishReport {
        let mut deliveries = Vec::with_capacity(self.consumers.len());
        for consumer in &self.consumers {
            let status = match consumer.apply(cx, fact) {
                Ok(ConsumerOutcome::Applied) => DeliveryStatus::Applied,
                Ok(ConsumerOutcome::AlreadyProcessed) => DeliveryStatus::AlreadyProcessed,
                Ok(ConsumerOutcome::NotApplicable) => DeliveryStatus::NotApplicable,
                Err(e) => {
                    eprintln!(
                        "{} consumer {} failed on fact {} ({}): {}",
                        "warning:".bright_yellow().bold(),
                        consumer.name(),
                        fact.fact_id,
                        fact.kind.label(),
                        e
                    );
                    DeliveryStatus::Failed {
                        kind: e.label().to_string(),
                        message: e.to_string(),
                    }
                }
            };
            deliveries.push(Delivery {
                consumer: consumer.name(),
                status,
            });
        }
        PublishReport {
            fact_id: fact.fact_id.clone(),
            deliveries,
        }
    }
}

impl Default for FactBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point used by collaborators after they commit a mutation.
pub fn publish_fact(cx: &InterpContext, fact: &Fact) -> PublishReport {
    FactBus::standard().publish(cx, fact)
}
