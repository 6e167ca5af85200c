// Embedded persistence backend using RocksDB
// Provides standalone (single-node) storage without an external database

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{DB, IteratorMode, Options};

use crate::model::{LeaseFilter, LeaseRecord, LeaseUpdate, StorageMode};
use crate::traits::{LeasePersistence, LeaseStore, ResumePersistence};

/// Column family holding lease records keyed by reference
pub const CF_LEASES: &str = "leases";
/// Column family holding resume rows keyed by name
pub const CF_RESUME: &str = "resume";

/// Standalone embedded lease store using RocksDB
///
/// Records are stored as JSON. Read-modify-write operations (insert-if-absent,
/// guarded updates) are serialized by an in-process lock; RocksDB itself is
/// opened once and shared.
pub struct EmbeddedLeaseStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl EmbeddedLeaseStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path.as_ref(), [CF_LEASES, CF_RESUME])
            .map_err(|e| anyhow::anyhow!("RocksDB open error: {}", e))?;

        tracing::info!(path = %path.as_ref().display(), "Opened embedded lease store");
        Ok(Self::new(Arc::new(db)))
    }

    /// Create from a raw RocksDB instance that already has both column families
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Get a column family handle
    fn cf(&self, name: &str) -> anyhow::Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow::anyhow!("Column family '{}' not found", name))
    }

    fn get_record(&self, reference: &str) -> anyhow::Result<Option<LeaseRecord>> {
        let cf = self.cf(CF_LEASES)?;
        let bytes = self
            .db
            .get_cf(cf, reference.as_bytes())
            .map_err(|e| anyhow::anyhow!("RocksDB get error: {}", e))?;
        bytes
            .map(|b| serde_json::from_slice::<LeaseRecord>(&b).map_err(anyhow::Error::from))
            .transpose()
    }

    fn put_record(&self, record: &LeaseRecord) -> anyhow::Result<()> {
        let cf = self.cf(CF_LEASES)?;
        let value = serde_json::to_vec(record)?;
        self.db
            .put_cf(cf, record.reference.as_bytes(), value)
            .map_err(|e| anyhow::anyhow!("RocksDB put error: {}", e))
    }
}

#[async_trait]
impl LeaseStore for EmbeddedLeaseStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Embedded
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.cf(CF_LEASES)?;
        self.cf(CF_RESUME)?;
        Ok(())
    }
}

#[async_trait]
impl LeasePersistence for EmbeddedLeaseStore {
    async fn insert(&self, record: &LeaseRecord) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock();
        if self.get_record(&record.reference)?.is_some() {
            return Ok(false);
        }
        self.put_record(record)?;
        Ok(true)
    }

    async fn update_by_key(&self, reference: &str, update: &LeaseUpdate) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock();
        let Some(mut record) = self.get_record(reference)? else {
            return Ok(false);
        };
        if update
            .expected_status
            .is_some_and(|expected| expected != record.status)
        {
            return Ok(false);
        }
        if update.is_empty() {
            return Ok(true);
        }
        record.apply(update);
        self.put_record(&record)?;
        Ok(true)
    }

    async fn query_by_filter(&self, filter: &LeaseFilter) -> anyhow::Result<Vec<LeaseRecord>> {
        if let Some(ref reference) = filter.reference {
            let record = self.get_record(reference)?;
            return Ok(record.into_iter().filter(|r| filter.matches(r)).collect());
        }

        let cf = self.cf(CF_LEASES)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| anyhow::anyhow!("RocksDB iterator error: {}", e))?;
            let record: LeaseRecord = serde_json::from_slice(&value)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        Ok(records)
    }

    async fn find_by_key(&self, reference: &str) -> anyhow::Result<Option<LeaseRecord>> {
        self.get_record(reference)
    }

    async fn delete_by_key(&self, reference: &str) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock();
        if self.get_record(reference)?.is_none() {
            return Ok(false);
        }
        let cf = self.cf(CF_LEASES)?;
        self.db
            .delete_cf(cf, reference.as_bytes())
            .map_err(|e| anyhow::anyhow!("RocksDB delete error: {}", e))?;
        Ok(true)
    }
}

#[async_trait]
impl ResumePersistence for EmbeddedLeaseStore {
    async fn get_resume_value(&self, name: &str) -> anyhow::Result<Option<u64>> {
        let cf = self.cf(CF_RESUME)?;
        let bytes = self
            .db
            .get_cf(cf, name.as_bytes())
            .map_err(|e| anyhow::anyhow!("RocksDB get error: {}", e))?;
        match bytes {
            Some(b) => {
                let text = std::str::from_utf8(&b)?;
                Ok(Some(text.parse::<u64>()?))
            }
            None => Ok(None),
        }
    }

    async fn set_resume_value(&self, name: &str, value: u64) -> anyhow::Result<()> {
        let cf = self.cf(CF_RESUME)?;
        self.db
            .put_cf(cf, name.as_bytes(), value.to_string().as_bytes())
            .map_err(|e| anyhow::anyhow!("RocksDB put error: {}", e))
    }
}
