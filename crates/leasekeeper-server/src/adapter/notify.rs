//! Upstream notifications over HTTP
//!
//! Success notices go to `POST {base}/leases/success`, failure notices to
//! `POST {base}/leases/failure`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use leasekeeper_lease::{LeaseFailure, LeaseSuccess, NotificationSink};

use super::{http_client, trim_base};

pub struct HttpNotificationSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }

    async fn post(&self, path: &str, body: &impl serde::Serialize) -> anyhow::Result<()> {
        let url = format!("{}/leases/{}", self.base_url, path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        debug!(url = %url, "Notice delivered");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn notify_success(&self, success: LeaseSuccess) -> anyhow::Result<()> {
        self.post("success", &success).await
    }

    async fn notify_failure(&self, failure: LeaseFailure) -> anyhow::Result<()> {
        self.post("failure", &failure).await
    }
}
