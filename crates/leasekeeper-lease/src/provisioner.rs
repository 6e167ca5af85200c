//! Provisioner seam and single-flight gate
//!
//! The provisioner backend cannot run two operations at once. Every `create`
//! and `destroy` goes through one [`ProvisionerGate`]; holding a
//! [`ProvisionSlot`] is the only way to reach the provisioner.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use leasekeeper_common::LeaseError;

use crate::model::{ProvisionSpec, ProvisionedResource};

/// Backend that creates and destroys leased resources
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create(&self, spec: &ProvisionSpec) -> anyhow::Result<ProvisionedResource>;

    async fn destroy(&self, resource_name: &str) -> anyhow::Result<()>;
}

/// Single-flight access to a [`Provisioner`]
///
/// Waiters are served in FIFO order by the tokio mutex.
pub struct ProvisionerGate {
    provisioner: Arc<dyn Provisioner>,
    lock: Mutex<()>,
}

impl ProvisionerGate {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            lock: Mutex::new(()),
        }
    }

    /// Wait for the slot
    pub async fn acquire(&self) -> ProvisionSlot<'_> {
        let guard = self.lock.lock().await;
        ProvisionSlot {
            provisioner: self.provisioner.as_ref(),
            _guard: guard,
        }
    }

    /// Take the slot only if nobody holds it
    pub fn try_acquire(&self) -> Option<ProvisionSlot<'_>> {
        let guard = self.lock.try_lock().ok()?;
        Some(ProvisionSlot {
            provisioner: self.provisioner.as_ref(),
            _guard: guard,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Exclusive use of the provisioner until dropped
pub struct ProvisionSlot<'a> {
    provisioner: &'a dyn Provisioner,
    _guard: MutexGuard<'a, ()>,
}

impl ProvisionSlot<'_> {
    pub async fn create(&self, spec: &ProvisionSpec) -> Result<ProvisionedResource, LeaseError> {
        self.provisioner
            .create(spec)
            .await
            .map_err(LeaseError::provision)
    }

    pub async fn destroy(&self, resource_name: &str) -> Result<(), LeaseError> {
        self.provisioner
            .destroy(resource_name)
            .await
            .map_err(LeaseError::destroy)
    }
}
