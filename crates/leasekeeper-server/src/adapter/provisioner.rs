//! Provisioner backend reached over HTTP
//!
//! `POST {base}/instances` with the provision spec returns the created
//! resource; `DELETE {base}/instances/{name}` destroys it. The resource name
//! is sent as one percent-encoded path segment.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use leasekeeper_lease::{ProvisionSpec, ProvisionedResource, Provisioner};

use super::http_client;

pub struct HttpProvisioner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProvisioner {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid provisioner url '{}'", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("provisioner url '{}' cannot carry a path", base_url);
        }
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
        })
    }

    /// `{base}/instances[/{name}]`, each segment percent-encoded
    fn instances_url(&self, resource_name: Option<&str>) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                anyhow::anyhow!("provisioner url '{}' cannot carry a path", self.base_url)
            })?;
            segments.pop_if_empty().push("instances");
            if let Some(name) = resource_name {
                segments.push(name);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn create(&self, spec: &ProvisionSpec) -> anyhow::Result<ProvisionedResource> {
        let url = self.instances_url(None)?;
        debug!(url = %url, image = %spec.image, "Creating instance");

        let resource = self
            .client
            .post(url)
            .json(spec)
            .send()
            .await?
            .error_for_status()?
            .json::<ProvisionedResource>()
            .await?;

        info!(name = %resource.name, "Instance created");
        Ok(resource)
    }

    async fn destroy(&self, resource_name: &str) -> anyhow::Result<()> {
        let url = self.instances_url(Some(resource_name))?;
        debug!(url = %url, "Destroying instance");

        self.client.delete(url).send().await?.error_for_status()?;

        info!(name = %resource_name, "Instance destroyed");
        Ok(())
    }
}
