//! Persistence traits for the lease storage abstraction layer
//!
//! This module defines the persistence traits that abstract over the storage
//! backends: external database (MySQL/PostgreSQL/SQLite), embedded RocksDB, and
//! process memory.

pub mod lease;
pub mod resume;

pub use lease::LeasePersistence;
pub use resume::ResumePersistence;

use async_trait::async_trait;

use crate::model::StorageMode;

/// Unified lease store
///
/// This is the main interface the lease engine talks to. Every method is one
/// unit of work; no transaction spans two calls.
#[async_trait]
pub trait LeaseStore: LeasePersistence + ResumePersistence + Send + Sync {
    /// Get the current storage mode
    fn storage_mode(&self) -> StorageMode;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}
