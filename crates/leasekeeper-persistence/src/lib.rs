//! Leasekeeper Persistence - Lease records and resume markers
//!
//! This crate provides:
//! - SeaORM entity definitions for the `leases` and `resume` tables
//! - Persistence trait abstractions for unified storage
//! - Storage backends: external database, embedded RocksDB, and memory
//! - Domain model types for persistence operations

pub mod embedded;
pub mod entity;
pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export entity prelude
pub use entity::prelude::*;

// Re-export persistence traits
pub use traits::{LeasePersistence, LeaseStore, ResumePersistence};

// Re-export backends
pub use embedded::EmbeddedLeaseStore;
pub use memory::MemoryLeaseStore;
pub use sql::ExternalDbLeaseStore;

// Re-export model types
pub use model::{LeaseFilter, LeaseRecord, LeaseUpdate, StorageMode};
