//! Lease store selection by storage mode.

use std::sync::Arc;

use tracing::{info, warn};

use leasekeeper_persistence::{
    EmbeddedLeaseStore, ExternalDbLeaseStore, LeaseStore, MemoryLeaseStore, StorageMode,
};

use crate::model::Configuration;

/// Open the store configured under `storage.mode`
pub async fn open_store(configuration: &Configuration) -> anyhow::Result<Arc<dyn LeaseStore>> {
    let mode = configuration.storage_mode()?;
    let store: Arc<dyn LeaseStore> = match mode {
        StorageMode::ExternalDb => {
            let url = configuration.database_url()?;
            Arc::new(
                ExternalDbLeaseStore::connect(&url, configuration.database_max_connections())
                    .await?,
            )
        }
        StorageMode::Embedded => {
            let dir = configuration.embedded_data_dir();
            std::fs::create_dir_all(&dir)?;
            Arc::new(EmbeddedLeaseStore::open(&dir)?)
        }
        StorageMode::Memory => {
            warn!("Memory storage selected, leases are lost on restart");
            Arc::new(MemoryLeaseStore::new())
        }
    };
    info!(storage = %mode, "Lease store opened");
    Ok(store)
}
