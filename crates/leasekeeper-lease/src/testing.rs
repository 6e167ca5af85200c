//! Scripted collaborators shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use leasekeeper_common::Moment;

use crate::heartbeat::HeartbeatClient;
use crate::model::{LeaseFailure, LeaseSuccess, ProvisionSpec, ProvisionedResource};
use crate::notify::NotificationSink;
use crate::provisioner::Provisioner;

type Hook = Box<dyn FnOnce() + Send>;

/// Provisioner that hands out `c1`, `c2`, ... and records every call
#[derive(Default)]
pub struct FakeProvisioner {
    pub creates: Mutex<Vec<ProvisionSpec>>,
    pub destroyed: Mutex<Vec<String>>,
    pub fail_create: AtomicBool,
    pub fail_destroy: AtomicBool,
    /// Run once inside the next `create`
    pub on_create: Mutex<Option<Hook>>,
    /// When set, `create` blocks until notified
    pub create_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeProvisioner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().len()
    }

    pub fn set_on_create(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_create.lock() = Some(Box::new(hook));
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn create(&self, spec: &ProvisionSpec) -> anyhow::Result<ProvisionedResource> {
        let count = {
            let mut creates = self.creates.lock();
            creates.push(spec.clone());
            creates.len()
        };
        let gate = self.create_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let hook = self.on_create.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        if self.fail_create.load(Ordering::SeqCst) {
            anyhow::bail!("no capacity");
        }
        let name = format!("c{}", count);
        Ok(ProvisionedResource {
            descriptor: serde_json::json!({ "name": name }),
            name,
        })
    }

    async fn destroy(&self, resource_name: &str) -> anyhow::Result<()> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            anyhow::bail!("destroy refused");
        }
        self.destroyed.lock().push(resource_name.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub successes: Mutex<Vec<LeaseSuccess>>,
    pub failures: Mutex<Vec<LeaseFailure>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn total(&self) -> usize {
        self.successes.lock().len() + self.failures.lock().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify_success(&self, success: LeaseSuccess) -> anyhow::Result<()> {
        self.successes.lock().push(success);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("webhook down");
        }
        Ok(())
    }

    async fn notify_failure(&self, failure: LeaseFailure) -> anyhow::Result<()> {
        self.failures.lock().push(failure);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("webhook down");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHeartbeat {
    pub sent: Mutex<Vec<Moment>>,
    /// Milliseconds each send takes; 0 answers immediately
    pub delay_ms: AtomicU64,
}

impl RecordingHeartbeat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl HeartbeatClient for RecordingHeartbeat {
    async fn send_heartbeat(&self, moment: Moment) -> anyhow::Result<()> {
        self.sent.lock().push(moment);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }
}
