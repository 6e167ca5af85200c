//! Lease record persistence trait

use async_trait::async_trait;

use crate::model::{LeaseFilter, LeaseRecord, LeaseUpdate};

/// Keyed table of lease records
#[async_trait]
pub trait LeasePersistence: Send + Sync {
    /// Insert a new record; returns `false` when the reference already exists
    async fn insert(&self, record: &LeaseRecord) -> anyhow::Result<bool>;

    /// Update the record with the given reference; returns `false` when no
    /// record matched (missing, or `expected_status` did not hold)
    async fn update_by_key(&self, reference: &str, update: &LeaseUpdate) -> anyhow::Result<bool>;

    /// Records matching the exact-match filter, oldest first
    async fn query_by_filter(&self, filter: &LeaseFilter) -> anyhow::Result<Vec<LeaseRecord>>;

    /// Get a record by reference
    async fn find_by_key(&self, reference: &str) -> anyhow::Result<Option<LeaseRecord>>;

    /// Delete a record; returns `false` when it did not exist
    async fn delete_by_key(&self, reference: &str) -> anyhow::Result<bool>;
}
