//! SQL-based persistence backend (MySQL/PostgreSQL/SQLite via SeaORM)
//!
//! Each trait method checks a connection out of the SeaORM pool, runs one
//! statement, and returns it.

use async_trait::async_trait;
use sea_orm::{prelude::Expr, sea_query::OnConflict, *};

use leasekeeper_common::LeaseStatus;

use crate::entity::{leases, resume};
use crate::model::*;
use crate::traits::*;

/// External database lease store
///
/// Wraps a SeaORM `DatabaseConnection` and implements all persistence traits
/// with direct queries against the `leases` and `resume` tables.
pub struct ExternalDbLeaseStore {
    db: DatabaseConnection,
}

impl ExternalDbLeaseStore {
    /// Create a new ExternalDbLeaseStore with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect to `url` and create the tables when they are missing
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(max_connections)
            .sqlx_logging(false);
        let db = Database::connect(options).await?;
        let store = Self::new(db);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the `leases` and `resume` tables if they do not exist
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut statements = [
            schema.create_table_from_entity(leases::Entity),
            schema.create_table_from_entity(resume::Entity),
        ];
        for statement in statements.iter_mut() {
            statement.if_not_exists();
            self.db.execute(backend.build(&*statement)).await?;
        }

        tracing::debug!(backend = ?backend, "Lease tables ensured");
        Ok(())
    }
}

fn to_record(model: leases::Model) -> anyhow::Result<LeaseRecord> {
    let status = model
        .status
        .parse::<LeaseStatus>()
        .map_err(|e| anyhow::anyhow!("lease '{}': {}", model.reference, e))?;

    Ok(LeaseRecord {
        reference: model.reference,
        timestamp: model.timestamp,
        tenant: model.tenant,
        duration: u32::try_from(model.duration)?,
        resource_name: model.resource_name,
        creation_tick: model.creation_tick.map(u64::try_from).transpose()?,
        status,
    })
}

// ============================================================================
// LeaseStore implementation
// ============================================================================

#[async_trait]
impl LeaseStore for ExternalDbLeaseStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::ExternalDb
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}

// ============================================================================
// LeasePersistence implementation
// ============================================================================

#[async_trait]
impl LeasePersistence for ExternalDbLeaseStore {
    async fn insert(&self, record: &LeaseRecord) -> anyhow::Result<bool> {
        let model = leases::ActiveModel {
            reference: Set(record.reference.clone()),
            timestamp: Set(record.timestamp),
            tenant: Set(record.tenant.clone()),
            duration: Set(i32::try_from(record.duration)?),
            resource_name: Set(record.resource_name.clone()),
            creation_tick: Set(record.creation_tick.map(i64::try_from).transpose()?),
            status: Set(record.status.as_str().to_string()),
        };

        match leases::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_by_key(&self, reference: &str, update: &LeaseUpdate) -> anyhow::Result<bool> {
        if update.is_empty() {
            let current = self.find_by_key(reference).await?;
            return Ok(current.is_some_and(|r| {
                update.expected_status.is_none_or(|expected| expected == r.status)
            }));
        }

        let mut statement =
            leases::Entity::update_many().filter(leases::Column::Reference.eq(reference));

        if let Some(expected) = update.expected_status {
            statement = statement.filter(leases::Column::Status.eq(expected.as_str()));
        }
        if let Some(status) = update.status {
            statement = statement.col_expr(leases::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(ref resource_name) = update.resource_name {
            statement = statement.col_expr(
                leases::Column::ResourceName,
                Expr::value(resource_name.clone()),
            );
        }
        if let Some(creation_tick) = update.creation_tick {
            statement = statement.col_expr(
                leases::Column::CreationTick,
                Expr::value(i64::try_from(creation_tick)?),
            );
        }

        let result = statement.exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn query_by_filter(&self, filter: &LeaseFilter) -> anyhow::Result<Vec<LeaseRecord>> {
        let mut select = leases::Entity::find();

        if let Some(ref reference) = filter.reference {
            select = select.filter(leases::Column::Reference.eq(reference.as_str()));
        }
        if let Some(ref tenant) = filter.tenant {
            select = select.filter(leases::Column::Tenant.eq(tenant.as_str()));
        }
        if let Some(status) = filter.status {
            select = select.filter(leases::Column::Status.eq(status.as_str()));
        }

        select
            .order_by_asc(leases::Column::Timestamp)
            .order_by_asc(leases::Column::Reference)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn find_by_key(&self, reference: &str) -> anyhow::Result<Option<LeaseRecord>> {
        leases::Entity::find_by_id(reference.to_string())
            .one(&self.db)
            .await?
            .map(to_record)
            .transpose()
    }

    async fn delete_by_key(&self, reference: &str) -> anyhow::Result<bool> {
        let result = leases::Entity::delete_by_id(reference.to_string())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

// ============================================================================
// ResumePersistence implementation
// ============================================================================

#[async_trait]
impl ResumePersistence for ExternalDbLeaseStore {
    async fn get_resume_value(&self, name: &str) -> anyhow::Result<Option<u64>> {
        let value = resume::Entity::find_by_id(name.to_string())
            .one(&self.db)
            .await?
            .map(|m| u64::try_from(m.value))
            .transpose()?;
        Ok(value)
    }

    async fn set_resume_value(&self, name: &str, value: u64) -> anyhow::Result<()> {
        let model = resume::ActiveModel {
            name: Set(name.to_string()),
            value: Set(i64::try_from(value)?),
        };

        resume::Entity::insert(model)
            .on_conflict(
                OnConflict::column(resume::Column::Name)
                    .update_column(resume::Column::Value)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_store() -> ExternalDbLeaseStore {
        // One connection, otherwise every pooled connection gets its own
        // in-memory database
        ExternalDbLeaseStore::connect("sqlite::memory:", 1)
            .await
            .unwrap()
    }

    fn acquiring(reference: &str, tenant: &str, timestamp: i64) -> LeaseRecord {
        LeaseRecord::acquiring(reference, tenant, 3, timestamp)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = create_test_store().await;

        assert!(store.insert(&acquiring("r1", "A", 1)).await.unwrap());

        let found = store.find_by_key("r1").await.unwrap().unwrap();
        assert_eq!(found.tenant, "A");
        assert_eq!(found.duration, 3);
        assert_eq!(found.status, LeaseStatus::Acquiring);
        assert!(found.resource_name.is_none());

        assert!(store.find_by_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_returns_false() {
        let store = create_test_store().await;

        assert!(store.insert(&acquiring("r1", "A", 1)).await.unwrap());
        assert!(!store.insert(&acquiring("r1", "B", 2)).await.unwrap());

        let found = store.find_by_key("r1").await.unwrap().unwrap();
        assert_eq!(found.tenant, "A");
    }

    #[tokio::test]
    async fn test_update_with_expected_status() {
        let store = create_test_store().await;
        store.insert(&acquiring("r1", "A", 1)).await.unwrap();

        let update = LeaseUpdate::status(LeaseStatus::Acquired)
            .expect(LeaseStatus::Acquiring)
            .resource_name("c1")
            .creation_tick(1002);
        assert!(store.update_by_key("r1", &update).await.unwrap());

        let found = store.find_by_key("r1").await.unwrap().unwrap();
        assert_eq!(found.status, LeaseStatus::Acquired);
        assert_eq!(found.resource_name.as_deref(), Some("c1"));
        assert_eq!(found.creation_tick, Some(1002));

        // Guard no longer holds
        let stale = LeaseUpdate::status(LeaseStatus::Failed).expect(LeaseStatus::Acquiring);
        assert!(!store.update_by_key("r1", &stale).await.unwrap());
        assert!(!store.update_by_key("missing", &stale).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_by_filter() {
        let store = create_test_store().await;
        store.insert(&acquiring("r1", "A", 1)).await.unwrap();
        store.insert(&acquiring("r2", "A", 2)).await.unwrap();
        store.insert(&acquiring("r3", "B", 3)).await.unwrap();
        store
            .update_by_key("r2", &LeaseUpdate::status(LeaseStatus::Failed))
            .await
            .unwrap();

        let all = store.query_by_filter(&LeaseFilter::all()).await.unwrap();
        let refs: Vec<_> = all.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["r1", "r2", "r3"]);

        let tenant_a = store
            .query_by_filter(&LeaseFilter::by_tenant("A"))
            .await
            .unwrap();
        assert_eq!(tenant_a.len(), 2);

        let failed = store
            .query_by_filter(&LeaseFilter::by_status(LeaseStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reference, "r2");
    }

    #[tokio::test]
    async fn test_delete_by_key() {
        let store = create_test_store().await;
        store.insert(&acquiring("r1", "A", 1)).await.unwrap();

        assert!(store.delete_by_key("r1").await.unwrap());
        assert!(!store.delete_by_key("r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_resume_value_upsert() {
        let store = create_test_store().await;

        assert!(
            store
                .get_resume_value("last_watched_tick")
                .await
                .unwrap()
                .is_none()
        );

        store.set_resume_value("last_watched_tick", 10).await.unwrap();
        store.set_resume_value("last_watched_tick", 11).await.unwrap();
        assert_eq!(
            store.get_resume_value("last_watched_tick").await.unwrap(),
            Some(11)
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = create_test_store().await;
        assert!(store.health_check().await.is_ok());
        assert_eq!(store.storage_mode(), StorageMode::ExternalDb);
    }
}
