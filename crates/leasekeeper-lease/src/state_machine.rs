//! Lease state machine
//!
//! Owns every write to a lease record's status. Transitions are checked against
//! [`LeaseStatus::can_transition_to`] and written as a compare-and-set on the
//! current status, so two racing writers cannot both move the same record.

use std::sync::Arc;

use tracing::debug;

use leasekeeper_common::utils::is_valid_reference;
use leasekeeper_common::{LeaseError, LeaseStatus, Tick, current_timestamp_ms};
use leasekeeper_persistence::{LeaseRecord, LeaseStore, LeaseUpdate};

pub struct LeaseStateMachine {
    store: Arc<dyn LeaseStore>,
}

impl LeaseStateMachine {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Create the `Acquiring` record for a new reference
    pub async fn create_acquiring(
        &self,
        reference: &str,
        tenant: &str,
        duration: u32,
    ) -> Result<LeaseRecord, LeaseError> {
        if !is_valid_reference(reference) {
            return Err(LeaseError::IllegalArgument(format!(
                "invalid lease reference '{}'",
                reference
            )));
        }
        if duration == 0 {
            return Err(LeaseError::IllegalArgument(
                "lease duration must be at least 1 moment".to_string(),
            ));
        }

        let record = LeaseRecord::acquiring(reference, tenant, duration, current_timestamp_ms());
        let inserted = self
            .store
            .insert(&record)
            .await
            .map_err(LeaseError::persistence)?;
        if !inserted {
            return Err(LeaseError::DuplicateLease(reference.to_string()));
        }

        debug!(reference = %reference, tenant = %tenant, duration, "Lease record created");
        Ok(record)
    }

    /// Move a lease to `target`
    ///
    /// `Acquired` carries provisioning fields and goes through
    /// [`mark_acquired`](Self::mark_acquired) instead.
    pub async fn transition_to(
        &self,
        reference: &str,
        target: LeaseStatus,
    ) -> Result<LeaseRecord, LeaseError> {
        if target == LeaseStatus::Acquired {
            return Err(LeaseError::IllegalArgument(format!(
                "lease '{}': Acquired requires resource_name and creation_tick",
                reference
            )));
        }
        self.apply(reference, target, LeaseUpdate::status(target))
            .await
    }

    /// Move an `Acquiring` lease to `Acquired` with its resource
    pub async fn mark_acquired(
        &self,
        reference: &str,
        resource_name: &str,
        creation_tick: Tick,
    ) -> Result<LeaseRecord, LeaseError> {
        if resource_name.is_empty() {
            return Err(LeaseError::IllegalArgument(format!(
                "lease '{}': empty resource name",
                reference
            )));
        }
        let update = LeaseUpdate::status(LeaseStatus::Acquired)
            .resource_name(resource_name)
            .creation_tick(creation_tick);
        self.apply(reference, LeaseStatus::Acquired, update).await
    }

    pub async fn get(&self, reference: &str) -> Result<LeaseRecord, LeaseError> {
        self.store
            .find_by_key(reference)
            .await
            .map_err(LeaseError::persistence)?
            .ok_or_else(|| LeaseError::LeaseNotFound(reference.to_string()))
    }

    async fn apply(
        &self,
        reference: &str,
        target: LeaseStatus,
        update: LeaseUpdate,
    ) -> Result<LeaseRecord, LeaseError> {
        let mut record = self.get(reference).await?;
        let from = record.status;
        if !from.can_transition_to(target) {
            return Err(LeaseError::InvalidTransition {
                reference: reference.to_string(),
                from,
                to: target,
            });
        }

        let update = update.expect(from);
        let applied = self
            .store
            .update_by_key(reference, &update)
            .await
            .map_err(LeaseError::persistence)?;
        if !applied {
            // Lost a race with another writer
            let current = self.get(reference).await?;
            return Err(LeaseError::InvalidTransition {
                reference: reference.to_string(),
                from: current.status,
                to: target,
            });
        }

        record.apply(&update);
        debug!(reference = %reference, from = %from, to = %target, "Lease transitioned");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasekeeper_persistence::MemoryLeaseStore;

    fn state_machine() -> (LeaseStateMachine, Arc<MemoryLeaseStore>) {
        let store = Arc::new(MemoryLeaseStore::new());
        (LeaseStateMachine::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_acquiring() {
        let (sm, _store) = state_machine();
        let record = sm.create_acquiring("r1", "A", 2).await.unwrap();
        assert_eq!(record.status, LeaseStatus::Acquiring);
        assert_eq!(record.duration, 2);
        assert!(record.resource_name.is_none());

        let stored = sm.get("r1").await.unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let (sm, store) = state_machine();
        sm.create_acquiring("r1", "A", 1).await.unwrap();
        sm.transition_to("r1", LeaseStatus::Failed).await.unwrap();

        let err = sm.create_acquiring("r1", "B", 5).await.unwrap_err();
        assert!(matches!(err, LeaseError::DuplicateLease(ref r) if r == "r1"));

        // Original record untouched
        let record = sm.get("r1").await.unwrap();
        assert_eq!(record.tenant, "A");
        assert_eq!(record.status, LeaseStatus::Failed);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let (sm, store) = state_machine();
        assert!(matches!(
            sm.create_acquiring("r1", "A", 0).await,
            Err(LeaseError::IllegalArgument(_))
        ));
        assert!(matches!(
            sm.create_acquiring("", "A", 1).await,
            Err(LeaseError::IllegalArgument(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (sm, _store) = state_machine();
        sm.create_acquiring("r1", "A", 1).await.unwrap();

        let record = sm.mark_acquired("r1", "c1", 1002).await.unwrap();
        assert_eq!(record.status, LeaseStatus::Acquired);
        assert_eq!(record.resource_name.as_deref(), Some("c1"));
        assert_eq!(record.creation_tick, Some(1002));

        let record = sm.transition_to("r1", LeaseStatus::Expired).await.unwrap();
        assert_eq!(record.status, LeaseStatus::Expired);
        assert_eq!(sm.get("r1").await.unwrap().status, LeaseStatus::Expired);
    }

    #[tokio::test]
    async fn test_expired_only_from_acquired() {
        let (sm, _store) = state_machine();
        sm.create_acquiring("r1", "A", 1).await.unwrap();

        let err = sm.transition_to("r1", LeaseStatus::Expired).await.unwrap_err();
        assert!(matches!(
            err,
            LeaseError::InvalidTransition {
                from: LeaseStatus::Acquiring,
                to: LeaseStatus::Expired,
                ..
            }
        ));

        sm.transition_to("r1", LeaseStatus::SashiTimeout)
            .await
            .unwrap();
        assert!(sm.transition_to("r1", LeaseStatus::Expired).await.is_err());
        assert!(sm.mark_acquired("r1", "c1", 5).await.is_err());
    }

    #[tokio::test]
    async fn test_acquired_requires_fields() {
        let (sm, _store) = state_machine();
        sm.create_acquiring("r1", "A", 1).await.unwrap();

        assert!(matches!(
            sm.transition_to("r1", LeaseStatus::Acquired).await,
            Err(LeaseError::IllegalArgument(_))
        ));
        assert!(matches!(
            sm.mark_acquired("r1", "", 1).await,
            Err(LeaseError::IllegalArgument(_))
        ));
        assert_eq!(sm.get("r1").await.unwrap().status, LeaseStatus::Acquiring);
    }

    #[tokio::test]
    async fn test_missing_lease() {
        let (sm, _store) = state_machine();
        assert!(matches!(
            sm.transition_to("nope", LeaseStatus::Failed).await,
            Err(LeaseError::LeaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_outage_is_persistence_error() {
        let (sm, store) = state_machine();
        store.set_available(false);
        assert!(matches!(
            sm.create_acquiring("r1", "A", 1).await,
            Err(LeaseError::Persistence(_))
        ));
    }
}
