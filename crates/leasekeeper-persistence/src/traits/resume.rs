//! Resume marker persistence trait

use async_trait::async_trait;

/// Named integer rows used to resume after a restart
#[async_trait]
pub trait ResumePersistence: Send + Sync {
    async fn get_resume_value(&self, name: &str) -> anyhow::Result<Option<u64>>;

    /// Insert or overwrite the named row
    async fn set_resume_value(&self, name: &str, value: u64) -> anyhow::Result<()>;
}
