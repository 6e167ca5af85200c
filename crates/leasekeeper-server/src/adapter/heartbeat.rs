//! Heartbeat endpoint client

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use leasekeeper_common::Moment;
use leasekeeper_lease::HeartbeatClient;

use super::http_client;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatBody {
    moment: Moment,
    timestamp: i64,
}

/// Posts `{"moment", "timestamp"}` to the configured URL
pub struct HttpHeartbeatClient {
    client: reqwest::Client,
    url: String,
}

impl HttpHeartbeatClient {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl HeartbeatClient for HttpHeartbeatClient {
    async fn send_heartbeat(&self, moment: Moment) -> anyhow::Result<()> {
        let body = HeartbeatBody {
            moment,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
