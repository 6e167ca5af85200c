//! Collaborator adapters
//!
//! HTTP implementations of the engine's provisioner, notification and
//! heartbeat seams, plus the local tick source.

pub mod heartbeat;
pub mod notify;
pub mod provisioner;
pub mod tick;

pub use heartbeat::HttpHeartbeatClient;
pub use notify::HttpNotificationSink;
pub use provisioner::HttpProvisioner;
pub use tick::LocalTickSource;

use std::time::Duration;

/// Shared reqwest client construction
pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
