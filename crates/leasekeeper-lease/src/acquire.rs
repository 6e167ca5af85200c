//! Acquire request handling
//!
//! Turns one [`AcquireRequest`] into a provisioned, scheduled lease or a
//! terminal failure, under a tick budget:
//!
//! - waiting for the provisioner slot may use `wait_timeout_fraction` of the
//!   window; past that the request times out without calling the provisioner
//! - `create` must have returned by `create_timeout_fraction` of the window;
//!   past that the fresh resource is destroyed again
//!
//! Elapsed ticks are measured from the tick observed when the record was
//! created. Every request ends with exactly one notification, except a
//! duplicate reference, which is dropped without side effects.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use leasekeeper_common::{LeaseError, LeaseStatus, Tick};

use crate::config::AcquirePolicy;
use crate::model::{AcquireOutcome, AcquireRequest, ExpiryEntry, LeaseFailure, LeaseSuccess};
use crate::notify::{self, NotificationSink};
use crate::provisioner::{ProvisionSlot, ProvisionerGate};
use crate::scheduler::ExpiryScheduler;
use crate::state_machine::LeaseStateMachine;
use crate::stats;

pub struct AcquireHandler {
    policy: AcquirePolicy,
    state_machine: Arc<LeaseStateMachine>,
    gate: Arc<ProvisionerGate>,
    scheduler: Arc<ExpiryScheduler>,
    notifier: Arc<dyn NotificationSink>,
    ticks: watch::Receiver<Tick>,
}

impl AcquireHandler {
    pub fn new(
        policy: AcquirePolicy,
        state_machine: Arc<LeaseStateMachine>,
        gate: Arc<ProvisionerGate>,
        scheduler: Arc<ExpiryScheduler>,
        notifier: Arc<dyn NotificationSink>,
        ticks: watch::Receiver<Tick>,
    ) -> Self {
        Self {
            policy,
            state_machine,
            gate,
            scheduler,
            notifier,
            ticks,
        }
    }

    pub fn policy(&self) -> AcquirePolicy {
        self.policy
    }

    fn current_tick(&self) -> Tick {
        *self.ticks.borrow()
    }

    /// Process one request to its final outcome; never returns an error
    pub async fn handle(&self, request: AcquireRequest) -> AcquireOutcome {
        let outcome = self.acquire(&request).await;
        stats::record_acquire(outcome.label());
        outcome
    }

    async fn acquire(&self, request: &AcquireRequest) -> AcquireOutcome {
        let reference = request.reference.as_str();

        match self
            .state_machine
            .create_acquiring(reference, &request.tenant, request.duration)
            .await
        {
            Ok(_) => {}
            Err(LeaseError::DuplicateLease(_)) => {
                warn!(reference = %reference, "Duplicate acquire request ignored");
                return AcquireOutcome::Duplicate;
            }
            Err(e) => return self.fail(request, e).await,
        }

        let start_tick = self.current_tick();
        info!(
            reference = %reference,
            tenant = %request.tenant,
            duration = request.duration,
            start_tick,
            "Acquiring lease"
        );

        let Some(slot) = self.wait_for_slot(start_tick).await else {
            let elapsed = self.current_tick().saturating_sub(start_tick);
            return self
                .time_out(request, elapsed, self.policy.wait_limit())
                .await;
        };

        let elapsed = self.current_tick().saturating_sub(start_tick);
        if self.policy.wait_exceeded(elapsed) {
            drop(slot);
            return self
                .time_out(request, elapsed, self.policy.wait_limit())
                .await;
        }

        let resource = match slot.create(&request.spec).await {
            Ok(resource) => resource,
            Err(e) => {
                drop(slot);
                return self.fail(request, e).await;
            }
        };

        let creation_tick = self.current_tick();
        let elapsed = creation_tick.saturating_sub(start_tick);
        if self.policy.create_exceeded(elapsed) {
            self.compensate(&slot, reference, &resource.name).await;
            drop(slot);
            return self
                .time_out(request, elapsed, self.policy.create_limit())
                .await;
        }

        let expiry_moment = self
            .scheduler
            .expiry_moment(creation_tick, request.duration);
        self.scheduler.register(ExpiryEntry {
            reference: reference.to_string(),
            resource_name: resource.name.clone(),
            expiry_moment,
        });

        if let Err(e) = self
            .state_machine
            .mark_acquired(reference, &resource.name, creation_tick)
            .await
        {
            self.scheduler.remove(reference);
            self.compensate(&slot, reference, &resource.name).await;
            drop(slot);
            return self.fail(request, e).await;
        }
        drop(slot);

        info!(
            reference = %reference,
            resource = %resource.name,
            creation_tick,
            expiry_moment,
            "Lease acquired"
        );
        let success = LeaseSuccess {
            reference: reference.to_string(),
            tenant: request.tenant.clone(),
            descriptor: resource.descriptor,
        };
        if let Err(e) = notify::send_success(self.notifier.as_ref(), success).await {
            warn!(reference = %reference, error = %e, "Failed to send success notification");
        }

        AcquireOutcome::Acquired {
            resource_name: resource.name,
            expiry_moment,
        }
    }

    /// Wait for the provisioner slot until the wait budget runs out
    async fn wait_for_slot(&self, start_tick: Tick) -> Option<ProvisionSlot<'_>> {
        let mut ticks = self.ticks.clone();
        let policy = self.policy;
        let budget_exhausted = async move {
            loop {
                let current = *ticks.borrow_and_update();
                if policy.wait_exceeded(current.saturating_sub(start_tick)) {
                    return;
                }
                if ticks.changed().await.is_err() {
                    // Tick feed gone; only the slot can end the wait now
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            biased;
            slot = self.gate.acquire() => Some(slot),
            _ = budget_exhausted => None,
        }
    }

    async fn compensate(&self, slot: &ProvisionSlot<'_>, reference: &str, resource_name: &str) {
        match slot.destroy(resource_name).await {
            Ok(()) => info!(
                reference = %reference,
                resource = %resource_name,
                "Destroyed resource of abandoned acquire"
            ),
            Err(e) => error!(
                reference = %reference,
                resource = %resource_name,
                error = %e,
                "Failed to destroy resource of abandoned acquire"
            ),
        }
    }

    async fn time_out(&self, request: &AcquireRequest, elapsed: u64, limit: f64) -> AcquireOutcome {
        let error = LeaseError::BudgetExceeded {
            elapsed,
            limit: limit as u64,
        };
        warn!(reference = %request.reference, error = %error, "Acquire timed out");
        self.settle(&request.reference, LeaseStatus::SashiTimeout)
            .await;
        self.notify_failure(request, error.to_string()).await;
        AcquireOutcome::TimedOut { elapsed }
    }

    async fn fail(&self, request: &AcquireRequest, error: LeaseError) -> AcquireOutcome {
        let reason = error.to_string();
        error!(reference = %request.reference, error = %reason, "Acquire failed");
        self.settle(&request.reference, LeaseStatus::Failed).await;
        self.notify_failure(request, reason.clone()).await;
        AcquireOutcome::Failed { reason }
    }

    /// Best-effort terminal transition
    async fn settle(&self, reference: &str, status: LeaseStatus) {
        if let Err(e) = self.state_machine.transition_to(reference, status).await {
            warn!(reference = %reference, status = %status, error = %e, "Could not record lease status");
        }
    }

    async fn notify_failure(&self, request: &AcquireRequest, reason: String) {
        let failure = LeaseFailure::for_request(request, reason);
        if let Err(e) = notify::send_failure(self.notifier.as_ref(), failure).await {
            warn!(reference = %request.reference, error = %e, "Failed to send failure notification");
        }
    }
}
