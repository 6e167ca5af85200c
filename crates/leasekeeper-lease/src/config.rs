//! Lease engine policy configuration
//!
//! Budget constants for acquisition and the heartbeat cadence. Every field has
//! a serde default so partial sections in `application.yml` work.

use serde::{Deserialize, Serialize};

use leasekeeper_common::{LeaseError, Moment};

/// Lease engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Total tick budget for one acquire, end to end (default: 100)
    #[serde(default = "default_acquire_window")]
    pub acquire_window: u64,

    /// Share of the window a request may spend waiting for the provisioner
    /// slot (default: 0.4)
    #[serde(default = "default_wait_timeout_fraction")]
    pub wait_timeout_fraction: f64,

    /// Share of the window by which `create` must have returned (default: 0.8)
    #[serde(default = "default_create_timeout_fraction")]
    pub create_timeout_fraction: f64,

    /// Heartbeat every N moments; 0 disables heartbeats (default: 1)
    #[serde(default = "default_heartbeat_frequency")]
    pub heartbeat_frequency: u64,

    /// Last heartbeat moment to assume when none is persisted, typically taken
    /// from the host's registration info
    #[serde(default)]
    pub initial_heartbeat_moment: Option<Moment>,
}

fn default_acquire_window() -> u64 {
    100
}

fn default_wait_timeout_fraction() -> f64 {
    0.4
}

fn default_create_timeout_fraction() -> f64 {
    0.8
}

fn default_heartbeat_frequency() -> u64 {
    1
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            acquire_window: default_acquire_window(),
            wait_timeout_fraction: default_wait_timeout_fraction(),
            create_timeout_fraction: default_create_timeout_fraction(),
            heartbeat_frequency: default_heartbeat_frequency(),
            initial_heartbeat_moment: None,
        }
    }
}

impl LeaseConfig {
    /// Check the budget constants are consistent
    pub fn validate(&self) -> Result<(), LeaseError> {
        if self.acquire_window == 0 {
            return Err(LeaseError::Config(
                "acquire_window must be greater than 0".to_string(),
            ));
        }
        if !(self.wait_timeout_fraction > 0.0
            && self.wait_timeout_fraction < self.create_timeout_fraction
            && self.create_timeout_fraction <= 1.0)
        {
            return Err(LeaseError::Config(format!(
                "expected 0 < wait_timeout_fraction ({}) < create_timeout_fraction ({}) <= 1",
                self.wait_timeout_fraction, self.create_timeout_fraction
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> AcquirePolicy {
        AcquirePolicy {
            acquire_window: self.acquire_window,
            wait_timeout_fraction: self.wait_timeout_fraction,
            create_timeout_fraction: self.create_timeout_fraction,
        }
    }
}

/// Tick budget applied to one acquire request
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquirePolicy {
    pub acquire_window: u64,
    pub wait_timeout_fraction: f64,
    pub create_timeout_fraction: f64,
}

impl AcquirePolicy {
    pub fn wait_limit(&self) -> f64 {
        self.wait_timeout_fraction * self.acquire_window as f64
    }

    pub fn create_limit(&self) -> f64 {
        self.create_timeout_fraction * self.acquire_window as f64
    }

    /// True when `elapsed` ticks exceed the slot-wait budget
    pub fn wait_exceeded(&self, elapsed: u64) -> bool {
        elapsed as f64 > self.wait_limit()
    }

    /// True when `elapsed` ticks exceed the create budget
    pub fn create_exceeded(&self, elapsed: u64) -> bool {
        elapsed as f64 > self.create_limit()
    }
}

impl Default for AcquirePolicy {
    fn default() -> Self {
        LeaseConfig::default().policy()
    }
}
