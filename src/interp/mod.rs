//! The interpretation core: immutable facts in, derived meaning out.
//!
//! Collaborators mutate intent (goals, tasks, plans) and then publish a
//! fact; the bus fans it out to consumers that derive goal progress,
//! streaks, snapshots, and the audit trail. Consumers are idempotent per
//! fact via the processing-receipt ledger, so redelivery is always safe.

pub mod audit;
pub mod bus;
pub mod evaluate;
pub mod fact;
pub mod ledger;
pub mod snapshot;
pub mod streak;

use crate::core::config::Config;
use crate::core::store::Store;
use crate::core::time::Clock;

/// Everything a consumer needs to act on a fact: the state store, the
/// fixed-zone clock, and project configuration.
#[derive(Debug, Clone)]
pub struct InterpContext {
    pub store: Store,
    pub clock: Clock,
    pub config: Config,
}

impl InterpContext {
    pub fn new(store: Store, clock: Clock, config: Config) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }
}
