//! Host heartbeat reporting
//!
//! One heartbeat per due moment: a moment is due when it is a multiple of the
//! configured frequency and later than the last moment a heartbeat succeeded
//! for. Heartbeats therefore go out in strictly increasing moment order, even
//! when tick work for neighbouring moments runs concurrently. A failed
//! heartbeat is not retried until the next due tick arrives.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use leasekeeper_common::{LeaseError, Moment, RESUME_LAST_HEARTBEAT_MOMENT};
use leasekeeper_persistence::LeaseStore;

use crate::stats;

/// Upstream endpoint receiving liveness heartbeats
#[async_trait]
pub trait HeartbeatClient: Send + Sync {
    async fn send_heartbeat(&self, moment: Moment) -> anyhow::Result<()>;
}

/// Client that only logs; used when no heartbeat endpoint is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHeartbeatClient;

#[async_trait]
impl HeartbeatClient for NoopHeartbeatClient {
    async fn send_heartbeat(&self, moment: Moment) -> anyhow::Result<()> {
        debug!(moment, "Heartbeat (no endpoint configured)");
        Ok(())
    }
}

/// Result of evaluating the heartbeat gate for one tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Frequency is 0
    Disabled,
    NotDue,
    /// Another heartbeat is still in flight
    InFlight,
    Sent,
    Failed(String),
}

pub struct HeartbeatReporter {
    client: Arc<dyn HeartbeatClient>,
    store: Arc<dyn LeaseStore>,
    frequency: u64,
    initial_moment: Option<Moment>,
    last_moment: Mutex<Option<Moment>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl HeartbeatReporter {
    pub fn new(
        client: Arc<dyn HeartbeatClient>,
        store: Arc<dyn LeaseStore>,
        frequency: u64,
        initial_moment: Option<Moment>,
    ) -> Self {
        Self {
            client,
            store,
            frequency,
            initial_moment,
            last_moment: Mutex::new(initial_moment),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the persisted heartbeat moment, falling back to the configured one
    pub async fn init(&self) -> Result<(), LeaseError> {
        let persisted = self
            .store
            .get_resume_value(RESUME_LAST_HEARTBEAT_MOMENT)
            .await
            .map_err(LeaseError::persistence)?;
        let last = persisted.or(self.initial_moment);
        *self.last_moment.lock() = last;
        info!(last_heartbeat_moment = ?last, frequency = self.frequency, "Heartbeat reporter initialized");
        Ok(())
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn last_heartbeat_moment(&self) -> Option<Moment> {
        *self.last_moment.lock()
    }

    pub fn is_due(&self, moment: Moment) -> bool {
        self.frequency != 0
            && moment % self.frequency == 0
            && self.last_heartbeat_moment().is_none_or(|last| moment > last)
    }

    /// Send a heartbeat for `moment` if it is due
    pub async fn on_moment(&self, moment: Moment) -> HeartbeatOutcome {
        if self.frequency == 0 {
            return HeartbeatOutcome::Disabled;
        }
        if !self.is_due(moment) {
            return HeartbeatOutcome::NotDue;
        }
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!(moment, "Heartbeat already in flight, skipping");
            return HeartbeatOutcome::InFlight;
        };
        // The in-flight one may have covered this or a later moment
        if !self.is_due(moment) {
            return HeartbeatOutcome::NotDue;
        }

        match self.client.send_heartbeat(moment).await {
            Ok(()) => {
                *self.last_moment.lock() = Some(moment);
                stats::record_heartbeat(true);
                if let Err(e) = self
                    .store
                    .set_resume_value(RESUME_LAST_HEARTBEAT_MOMENT, moment)
                    .await
                {
                    warn!(moment, error = %e, "Failed to persist heartbeat moment");
                }
                debug!(moment, "Heartbeat sent");
                HeartbeatOutcome::Sent
            }
            Err(e) => {
                stats::record_heartbeat(false);
                warn!(moment, error = %e, "Heartbeat failed");
                HeartbeatOutcome::Failed(format!("{:#}", e))
            }
        }
    }
}
