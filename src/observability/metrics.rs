//! Metrics exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder behind the `metrics` facade
//! - Serve the scrape endpoint for `reporting::PrometheusSink`
//!
//! # Metrics
//! - `trace_proxy_windows_total` (counter): windows reported
//! - `trace_proxy_window_index` (gauge): last reported window
//! - `trace_proxy_window_requests` (gauge): requests in the last window
//! - `trace_proxy_window_avg_response_seconds` (gauge): mean response time
//! - `trace_proxy_window_status_rate_percent{class}` (gauge): share per class

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the recorder and start the scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}
