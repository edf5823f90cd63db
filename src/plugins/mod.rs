//! Collaborator subsystems: the mutable-intent side of tidelog.
//!
//! Each collaborator commits its mutation through the broker, then
//! publishes a fact for the interpretation core to derive meaning from.

pub mod goal;
pub mod plan;
pub mod task;
pub mod user;
