//! Expiry scheduler
//!
//! Tracks every acquired lease with its expiry moment and reclaims resources
//! once the current moment has moved past it. The schedule lives in memory
//! only; [`ExpiryScheduler::reconcile`] rebuilds it from the store at startup.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use leasekeeper_common::{LeaseError, LeaseStatus, Moment, Tick};
use leasekeeper_persistence::{LeaseFilter, LeaseRecord, LeaseStore};

use crate::model::ExpiryEntry;
use crate::moment::MomentSource;
use crate::provisioner::ProvisionerGate;
use crate::state_machine::LeaseStateMachine;
use crate::stats;

/// What one sweep did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub moment: Moment,
    /// Destroyed and marked `Expired`
    pub expired: Vec<String>,
    /// Destroy failed; record left `Acquired` with no schedule entry
    pub orphaned: Vec<String>,
}

pub struct ExpiryScheduler {
    entries: DashMap<String, ExpiryEntry>,
    moments: Arc<dyn MomentSource>,
    sweep_lock: tokio::sync::Mutex<()>,
}

impl ExpiryScheduler {
    pub fn new(moments: Arc<dyn MomentSource>) -> Self {
        Self {
            entries: DashMap::new(),
            moments,
            sweep_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn moment_of(&self, tick: Tick) -> Moment {
        self.moments.moment_of(tick)
    }

    /// Expiry moment of a lease of `duration` moments created at `tick`
    ///
    /// Saturates at `Moment::MAX`; such a lease never expires.
    pub fn expiry_moment(&self, tick: Tick, duration: u32) -> Moment {
        self.moment_of(tick).saturating_add(Moment::from(duration))
    }

    pub fn register(&self, entry: ExpiryEntry) {
        debug!(
            reference = %entry.reference,
            resource = %entry.resource_name,
            expiry_moment = entry.expiry_moment,
            "Scheduled lease expiry"
        );
        self.entries.insert(entry.reference.clone(), entry);
        stats::set_active_leases(self.entries.len());
    }

    pub fn remove(&self, reference: &str) -> Option<ExpiryEntry> {
        let removed = self.entries.remove(reference).map(|(_, entry)| entry);
        stats::set_active_leases(self.entries.len());
        removed
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn expiry_of(&self, reference: &str) -> Option<Moment> {
        self.entries.get(reference).map(|e| e.expiry_moment)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the schedule, soonest expiry first
    pub fn entries(&self) -> Vec<ExpiryEntry> {
        let mut entries: Vec<ExpiryEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| {
            a.expiry_moment
                .cmp(&b.expiry_moment)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        entries
    }

    /// Entries whose expiry moment is strictly before `current_moment`
    pub fn due(&self, current_moment: Moment) -> Vec<ExpiryEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.expiry_moment < current_moment)
            .collect()
    }

    /// Rebuild the schedule from `Acquired` records
    ///
    /// Returns the number of entries registered.
    pub async fn reconcile(&self, store: &dyn LeaseStore) -> Result<usize, LeaseError> {
        let records = store
            .query_by_filter(&LeaseFilter::by_status(LeaseStatus::Acquired))
            .await
            .map_err(LeaseError::persistence)?;

        let mut registered = 0;
        for record in records {
            let (Some(resource_name), Some(creation_tick)) =
                (record.resource_name.clone(), record.creation_tick)
            else {
                warn!(
                    reference = %record.reference,
                    "Acquired lease without resource name or creation tick, skipping"
                );
                continue;
            };
            self.register(ExpiryEntry {
                expiry_moment: self.expiry_moment(creation_tick, record.duration),
                reference: record.reference,
                resource_name,
            });
            registered += 1;
        }

        info!(count = registered, "Expiry schedule reconciled");
        Ok(registered)
    }

    /// Destroy every resource whose lease expired before the moment of `tick`
    ///
    /// Sweeps run one at a time. Each destroy takes the provisioner slot on its
    /// own, so acquires may interleave between destroys.
    pub async fn sweep(
        &self,
        tick: Tick,
        gate: &ProvisionerGate,
        state_machine: &LeaseStateMachine,
    ) -> SweepReport {
        let _sweep = self.sweep_lock.lock().await;
        let moment = self.moment_of(tick);
        let mut report = SweepReport {
            moment,
            ..Default::default()
        };

        for entry in self.due(moment) {
            // Removed by an earlier sweep
            if !self.contains(&entry.reference) {
                continue;
            }

            let destroyed = {
                let slot = gate.acquire().await;
                slot.destroy(&entry.resource_name).await
            };
            self.remove(&entry.reference);

            match destroyed {
                Ok(()) => {
                    match state_machine
                        .transition_to(&entry.reference, LeaseStatus::Expired)
                        .await
                    {
                        Ok(_) => info!(
                            reference = %entry.reference,
                            resource = %entry.resource_name,
                            moment,
                            "Lease expired"
                        ),
                        Err(e) => error!(
                            reference = %entry.reference,
                            error = %e,
                            "Resource destroyed but lease could not be marked Expired"
                        ),
                    }
                    stats::record_expired();
                    report.expired.push(entry.reference);
                }
                Err(e) => {
                    error!(
                        reference = %entry.reference,
                        resource = %entry.resource_name,
                        error = %e,
                        "Failed to destroy expired resource, lease orphaned"
                    );
                    stats::record_orphaned();
                    report.orphaned.push(entry.reference);
                }
            }
        }

        report
    }

    /// `Acquired` records with no schedule entry
    pub async fn orphaned(&self, store: &dyn LeaseStore) -> Result<Vec<LeaseRecord>, LeaseError> {
        let scheduled: HashSet<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let records = store
            .query_by_filter(&LeaseFilter::by_status(LeaseStatus::Acquired))
            .await
            .map_err(LeaseError::persistence)?;
        Ok(records
            .into_iter()
            .filter(|r| !scheduled.contains(&r.reference))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProvisionSpec, ProvisionedResource};
    use crate::moment::FixedMomentSize;
    use crate::provisioner::Provisioner;
    use async_trait::async_trait;
    use leasekeeper_persistence::{LeasePersistence, LeaseUpdate, MemoryLeaseStore};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeProvisioner {
        destroyed: Mutex<Vec<String>>,
        fail_destroy: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn create(&self, _spec: &ProvisionSpec) -> anyhow::Result<ProvisionedResource> {
            anyhow::bail!("not used")
        }

        async fn destroy(&self, resource_name: &str) -> anyhow::Result<()> {
            if self.fail_destroy.lock().contains(resource_name) {
                anyhow::bail!("destroy refused");
            }
            self.destroyed.lock().push(resource_name.to_string());
            Ok(())
        }
    }

    struct Fixture {
        scheduler: ExpiryScheduler,
        store: Arc<MemoryLeaseStore>,
        state_machine: LeaseStateMachine,
        provisioner: Arc<FakeProvisioner>,
        gate: ProvisionerGate,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLeaseStore::new());
        let provisioner = Arc::new(FakeProvisioner::default());
        Fixture {
            scheduler: ExpiryScheduler::new(Arc::new(FixedMomentSize::new(100).unwrap())),
            state_machine: LeaseStateMachine::new(store.clone()),
            gate: ProvisionerGate::new(provisioner.clone()),
            store,
            provisioner,
        }
    }

    async fn acquired(f: &Fixture, reference: &str, resource: &str, tick: Tick, duration: u32) {
        f.state_machine
            .create_acquiring(reference, "A", duration)
            .await
            .unwrap();
        f.state_machine
            .mark_acquired(reference, resource, tick)
            .await
            .unwrap();
        f.scheduler.register(ExpiryEntry {
            reference: reference.to_string(),
            resource_name: resource.to_string(),
            expiry_moment: f.scheduler.expiry_moment(tick, duration),
        });
    }

    #[tokio::test]
    async fn test_expiry_is_strict() {
        let f = fixture();
        acquired(&f, "r1", "c1", 1002, 1).await;
        assert_eq!(f.scheduler.expiry_of("r1"), Some(11));

        // Moment 10 and 11: still paid for
        for tick in [1050, 1100, 1199] {
            let report = f.scheduler.sweep(tick, &f.gate, &f.state_machine).await;
            assert!(report.expired.is_empty());
        }
        assert!(f.scheduler.contains("r1"));
        assert!(f.provisioner.destroyed.lock().is_empty());

        let report = f.scheduler.sweep(1200, &f.gate, &f.state_machine).await;
        assert_eq!(report.moment, 12);
        assert_eq!(report.expired, vec!["r1".to_string()]);
        assert_eq!(*f.provisioner.destroyed.lock(), vec!["c1".to_string()]);
        assert!(!f.scheduler.contains("r1"));
        assert_eq!(
            f.state_machine.get("r1").await.unwrap().status,
            LeaseStatus::Expired
        );

        // Nothing left to do
        let report = f.scheduler.sweep(1300, &f.gate, &f.state_machine).await;
        assert!(report.expired.is_empty());
        assert_eq!(f.provisioner.destroyed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_failure_leaves_orphan() {
        let f = fixture();
        acquired(&f, "r1", "c1", 1000, 1).await;
        acquired(&f, "r2", "c2", 1000, 1).await;
        f.provisioner.fail_destroy.lock().insert("c1".to_string());

        let report = f.scheduler.sweep(1200, &f.gate, &f.state_machine).await;
        assert_eq!(report.orphaned, vec!["r1".to_string()]);
        assert_eq!(report.expired, vec!["r2".to_string()]);
        assert!(f.scheduler.is_empty());

        assert_eq!(
            f.state_machine.get("r1").await.unwrap().status,
            LeaseStatus::Acquired
        );
        let orphaned = f.scheduler.orphaned(f.store.as_ref()).await.unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].reference, "r1");

        // No retry on later ticks
        f.provisioner.fail_destroy.lock().clear();
        f.scheduler.sweep(1300, &f.gate, &f.state_machine).await;
        assert_eq!(*f.provisioner.destroyed.lock(), vec!["c2".to_string()]);
    }

    #[tokio::test]
    async fn test_reconcile_restores_expiry_moments() {
        let f = fixture();
        acquired(&f, "r1", "c1", 1002, 1).await;
        acquired(&f, "r2", "c2", 550, 4).await;
        acquired(&f, "r3", "c3", 3000, 2).await;
        let before = f.scheduler.entries();

        // Records outside the schedule are ignored
        f.state_machine.create_acquiring("r4", "B", 1).await.unwrap();
        f.state_machine
            .transition_to("r4", LeaseStatus::Failed)
            .await
            .unwrap();

        let restarted = ExpiryScheduler::new(Arc::new(FixedMomentSize::new(100).unwrap()));
        let count = restarted.reconcile(f.store.as_ref()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(restarted.entries(), before);
        assert_eq!(restarted.expiry_of("r2"), Some(9));
    }

    #[tokio::test]
    async fn test_reconcile_skips_incomplete_records() {
        let f = fixture();
        f.state_machine.create_acquiring("r1", "A", 1).await.unwrap();
        // Acquired without provisioning fields, written behind the state machine
        f.store
            .update_by_key("r1", &LeaseUpdate::status(LeaseStatus::Acquired))
            .await
            .unwrap();

        assert_eq!(f.scheduler.reconcile(f.store.as_ref()).await.unwrap(), 0);
        assert!(f.scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_saturates_near_end_of_clock() {
        let store = Arc::new(MemoryLeaseStore::new());
        let provisioner = Arc::new(FakeProvisioner::default());
        let f = Fixture {
            scheduler: ExpiryScheduler::new(Arc::new(FixedMomentSize::new(1).unwrap())),
            state_machine: LeaseStateMachine::new(store.clone()),
            gate: ProvisionerGate::new(provisioner.clone()),
            store,
            provisioner,
        };

        assert_eq!(f.scheduler.expiry_moment(u64::MAX - 1, 5), u64::MAX);
        assert_eq!(f.scheduler.expiry_moment(u64::MAX, u32::MAX), u64::MAX);

        acquired(&f, "r1", "c1", u64::MAX - 1, 5).await;
        assert_eq!(f.scheduler.expiry_of("r1"), Some(u64::MAX));
        let report = f
            .scheduler
            .sweep(u64::MAX, &f.gate, &f.state_machine)
            .await;
        assert!(report.expired.is_empty());
        assert!(f.scheduler.contains("r1"));
        assert!(f.provisioner.destroyed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_entries_sorted_by_expiry() {
        let f = fixture();
        f.scheduler.register(ExpiryEntry {
            reference: "b".to_string(),
            resource_name: "cb".to_string(),
            expiry_moment: 20,
        });
        f.scheduler.register(ExpiryEntry {
            reference: "a".to_string(),
            resource_name: "ca".to_string(),
            expiry_moment: 5,
        });
        let refs: Vec<_> = f
            .scheduler
            .entries()
            .into_iter()
            .map(|e| e.reference)
            .collect();
        assert_eq!(refs, vec!["a", "b"]);
        assert_eq!(f.scheduler.due(6).len(), 1);
        assert_eq!(f.scheduler.due(5).len(), 0);
        assert!(f.scheduler.remove("a").is_some());
        assert!(f.scheduler.remove("a").is_none());
    }
}
