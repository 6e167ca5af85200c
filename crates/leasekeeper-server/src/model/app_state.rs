//! Application state shared across HTTP handlers

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;

use leasekeeper_lease::{LeaseEvent, LeaseManager};

use crate::model::config::Configuration;

/// Shared state injected into every handler through `web::Data`
#[derive(Clone)]
pub struct AppState {
    pub configuration: Configuration,
    pub manager: Arc<LeaseManager>,
    /// Feeds the manager's event loop
    pub events: mpsc::Sender<LeaseEvent>,
    /// `None` when no recorder was installed (tests)
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        configuration: Configuration,
        manager: Arc<LeaseManager>,
        events: mpsc::Sender<LeaseEvent>,
    ) -> Self {
        Self {
            configuration,
            manager,
            events,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}
