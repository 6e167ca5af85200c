// Lease engine metrics
// Recorded through the `metrics` facade; the server installs the exporter

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const ACQUIRE_TOTAL: &str = "leasekeeper_acquire_total";
pub const EXPIRED_TOTAL: &str = "leasekeeper_expired_total";
pub const ORPHANED_TOTAL: &str = "leasekeeper_orphaned_leases_total";
pub const HEARTBEATS_TOTAL: &str = "leasekeeper_heartbeats_total";
pub const ACTIVE_LEASES: &str = "leasekeeper_active_leases";

/// Register descriptions for all engine metrics
/// Should be called once after the recorder is installed
pub fn describe_metrics() {
    describe_counter!(
        ACQUIRE_TOTAL,
        "Total number of acquire requests by outcome"
    );
    describe_counter!(
        EXPIRED_TOTAL,
        "Total number of leases expired and reclaimed"
    );
    describe_counter!(
        ORPHANED_TOTAL,
        "Total number of leases whose resource could not be destroyed on expiry"
    );
    describe_counter!(
        HEARTBEATS_TOTAL,
        "Total number of heartbeats sent by result"
    );
    describe_gauge!(
        ACTIVE_LEASES,
        "Current number of leases scheduled for expiry"
    );
}

/// Record the outcome of an acquire request
pub fn record_acquire(outcome: &'static str) {
    counter!(ACQUIRE_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_expired() {
    counter!(EXPIRED_TOTAL).increment(1);
}

pub fn record_orphaned() {
    counter!(ORPHANED_TOTAL).increment(1);
}

/// Record a heartbeat attempt
pub fn record_heartbeat(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!(HEARTBEATS_TOTAL, "result" => result).increment(1);
}

/// Update the number of scheduled leases
pub fn set_active_leases(count: usize) {
    gauge!(ACTIVE_LEASES).set(count as f64);
}
