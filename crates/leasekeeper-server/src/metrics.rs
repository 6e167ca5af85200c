// Metrics exporter wiring
// Engine metrics are described in leasekeeper_lease::stats; this installs the
// Prometheus recorder that renders them on GET /metrics

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use leasekeeper_lease::stats;

pub const HTTP_REQUESTS_TOTAL: &str = "leasekeeper_http_requests_total";

/// Install the global Prometheus recorder and describe all metrics
/// Must be called once, before any metric is recorded
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    stats::describe_metrics();
    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of API requests by endpoint"
    );

    Ok(handle)
}

/// Count one API request
pub fn record_request(endpoint: &'static str) {
    counter!(HTTP_REQUESTS_TOTAL, "endpoint" => endpoint).increment(1);
}
