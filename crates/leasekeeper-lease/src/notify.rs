//! Upstream acquire notifications

use async_trait::async_trait;
use tracing::info;

use leasekeeper_common::LeaseError;

use crate::model::{LeaseFailure, LeaseSuccess};

/// Receives the final disposition of every acquire request
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_success(&self, success: LeaseSuccess) -> anyhow::Result<()>;

    async fn notify_failure(&self, failure: LeaseFailure) -> anyhow::Result<()>;
}

/// Sink that only writes notices to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify_success(&self, success: LeaseSuccess) -> anyhow::Result<()> {
        info!(
            reference = %success.reference,
            tenant = %success.tenant,
            descriptor = %success.descriptor,
            "Lease acquired"
        );
        Ok(())
    }

    async fn notify_failure(&self, failure: LeaseFailure) -> anyhow::Result<()> {
        info!(
            reference = %failure.reference,
            tenant = %failure.tenant,
            duration = failure.duration,
            reason = %failure.reason,
            compensation_token = ?failure.compensation_token,
            "Lease acquire failed"
        );
        Ok(())
    }
}

pub async fn send_success(
    sink: &dyn NotificationSink,
    success: LeaseSuccess,
) -> Result<(), LeaseError> {
    sink.notify_success(success)
        .await
        .map_err(LeaseError::notification)
}

pub async fn send_failure(
    sink: &dyn NotificationSink,
    failure: LeaseFailure,
) -> Result<(), LeaseError> {
    sink.notify_failure(failure)
        .await
        .map_err(LeaseError::notification)
}
