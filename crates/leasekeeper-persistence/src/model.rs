//! Domain model types for the persistence abstraction layer
//!
//! These types are used as arguments and return values of the persistence
//! traits, decoupled from specific storage backends.

use serde::{Deserialize, Serialize};

use leasekeeper_common::{LeaseStatus, Tick};

/// Durable record of one lease, keyed by its acquire reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub reference: String,
    /// Creation time in Unix millis
    pub timestamp: i64,
    pub tenant: String,
    /// Paid duration in moments
    pub duration: u32,
    /// Provisioned resource name, set once the lease is acquired
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Tick at which provisioning completed, set once the lease is acquired
    #[serde(default)]
    pub creation_tick: Option<Tick>,
    pub status: LeaseStatus,
}

impl LeaseRecord {
    /// New record in the initial `Acquiring` state
    pub fn acquiring(reference: &str, tenant: &str, duration: u32, timestamp: i64) -> Self {
        Self {
            reference: reference.to_string(),
            timestamp,
            tenant: tenant.to_string(),
            duration,
            resource_name: None,
            creation_tick: None,
            status: LeaseStatus::Acquiring,
        }
    }

    /// Apply the set fields of an update to this record
    pub fn apply(&mut self, update: &LeaseUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref resource_name) = update.resource_name {
            self.resource_name = Some(resource_name.clone());
        }
        if let Some(creation_tick) = update.creation_tick {
            self.creation_tick = Some(creation_tick);
        }
    }
}

/// Partial update of a lease record
///
/// `expected_status` turns the update into a compare-and-set: the update only
/// applies when the stored status equals it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeaseUpdate {
    pub expected_status: Option<LeaseStatus>,
    pub status: Option<LeaseStatus>,
    pub resource_name: Option<String>,
    pub creation_tick: Option<Tick>,
}

impl LeaseUpdate {
    pub fn status(status: LeaseStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn expect(mut self, status: LeaseStatus) -> Self {
        self.expected_status = Some(status);
        self
    }

    pub fn resource_name(mut self, resource_name: &str) -> Self {
        self.resource_name = Some(resource_name.to_string());
        self
    }

    pub fn creation_tick(mut self, tick: Tick) -> Self {
        self.creation_tick = Some(tick);
        self
    }

    /// True when the update carries no field to write
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.resource_name.is_none() && self.creation_tick.is_none()
    }
}

/// Exact-match filter over lease records; unset fields match anything
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseFilter {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub status: Option<LeaseStatus>,
}

impl LeaseFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_status(status: LeaseStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn by_tenant(tenant: &str) -> Self {
        Self {
            tenant: Some(tenant.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &LeaseRecord) -> bool {
        self.reference
            .as_ref()
            .is_none_or(|r| *r == record.reference)
            && self.tenant.as_ref().is_none_or(|t| *t == record.tenant)
            && self.status.is_none_or(|s| s == record.status)
    }
}

/// Storage mode for the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// External database (MySQL/PostgreSQL/SQLite via SeaORM)
    ExternalDb,
    /// Embedded RocksDB (single node, no external DB)
    Embedded,
    /// Process memory only, lost on restart
    Memory,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::ExternalDb => write!(f, "external_db"),
            StorageMode::Embedded => write!(f, "embedded"),
            StorageMode::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "external_db" | "externaldb" | "db" => Ok(StorageMode::ExternalDb),
            "embedded" | "rocksdb" => Ok(StorageMode::Embedded),
            "memory" => Ok(StorageMode::Memory),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}
