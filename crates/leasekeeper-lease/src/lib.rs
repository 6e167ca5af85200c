//! Leasekeeper Lease - Lease lifecycle and expiry engine
//!
//! This crate provides:
//! - The lease state machine over the durable lease store
//! - Budgeted acquire handling behind a single-flight provisioner gate
//! - The tick-driven expiry scheduler and its startup reconciliation
//! - Heartbeat reporting
//! - The lease manager that drives all of the above from one event stream

pub mod acquire;
pub mod config;
pub mod heartbeat;
pub mod manager;
pub mod model;
pub mod moment;
pub mod notify;
pub mod provisioner;
pub mod scheduler;
pub mod state_machine;
pub mod stats;

#[cfg(test)]
mod testing;

pub use acquire::AcquireHandler;
pub use config::{AcquirePolicy, LeaseConfig};
pub use heartbeat::{HeartbeatClient, HeartbeatOutcome, HeartbeatReporter, NoopHeartbeatClient};
pub use manager::LeaseManager;
pub use model::{
    AcquireOutcome, AcquireRequest, ExpiryEntry, LeaseEvent, LeaseFailure, LeaseSuccess,
    ProvisionSpec, ProvisionedResource,
};
pub use moment::{FixedMomentSize, MomentSource};
pub use notify::{LoggingNotificationSink, NotificationSink};
pub use provisioner::{ProvisionSlot, Provisioner, ProvisionerGate};
pub use scheduler::{ExpiryScheduler, SweepReport};
pub use state_machine::LeaseStateMachine;
