//! In-memory lease store
//!
//! Keeps records in process memory. Used for ephemeral runs and as the store
//! behind engine tests; `set_available(false)` makes every call fail so
//! persistence outages can be simulated.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::{LeaseFilter, LeaseRecord, LeaseUpdate, StorageMode};
use crate::traits::{LeasePersistence, LeaseStore, ResumePersistence};

pub struct MemoryLeaseStore {
    leases: DashMap<String, LeaseRecord>,
    resume: DashMap<String, u64>,
    available: AtomicBool,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            leases: DashMap::new(),
            resume: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("memory lease store unavailable"))
        }
    }
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.check_available()
    }
}

#[async_trait]
impl LeasePersistence for MemoryLeaseStore {
    async fn insert(&self, record: &LeaseRecord) -> anyhow::Result<bool> {
        self.check_available()?;
        match self.leases.entry(record.reference.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn update_by_key(&self, reference: &str, update: &LeaseUpdate) -> anyhow::Result<bool> {
        self.check_available()?;
        let Some(mut record) = self.leases.get_mut(reference) else {
            return Ok(false);
        };
        if update
            .expected_status
            .is_some_and(|expected| expected != record.status)
        {
            return Ok(false);
        }
        record.apply(update);
        Ok(true)
    }

    async fn query_by_filter(&self, filter: &LeaseFilter) -> anyhow::Result<Vec<LeaseRecord>> {
        self.check_available()?;
        let mut records: Vec<LeaseRecord> = self
            .leases
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        Ok(records)
    }

    async fn find_by_key(&self, reference: &str) -> anyhow::Result<Option<LeaseRecord>> {
        self.check_available()?;
        Ok(self.leases.get(reference).map(|r| r.value().clone()))
    }

    async fn delete_by_key(&self, reference: &str) -> anyhow::Result<bool> {
        self.check_available()?;
        Ok(self.leases.remove(reference).is_some())
    }
}

#[async_trait]
impl ResumePersistence for MemoryLeaseStore {
    async fn get_resume_value(&self, name: &str) -> anyhow::Result<Option<u64>> {
        self.check_available()?;
        Ok(self.resume.get(name).map(|v| *v))
    }

    async fn set_resume_value(&self, name: &str, value: u64) -> anyhow::Result<()> {
        self.check_available()?;
        self.resume.insert(name.to_string(), value);
        Ok(())
    }
}
