//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the reporting sink selected in configuration
//! - Install the Prometheus exporter when that sink is chosen
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Runs after validation, so URLs and addresses are known to parse

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

use crate::config::{ProxyConfig, SinkKind};
use crate::observability::metrics::init_metrics;
use crate::reporting::{HttpSink, LogSink, MetricsReporter, PrometheusSink, SinkError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address: {0}")]
    MetricsAddress(#[from] AddrParseError),

    #[error("cannot install metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("invalid reporting endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("http reporting requires an endpoint")]
    MissingEndpoint,

    #[error("cannot build reporting sink: {0}")]
    Sink(#[from] SinkError),
}

/// Attach the configured sink to `reporter`.
pub fn configure_sink(reporter: &MetricsReporter, config: &ProxyConfig) -> Result<(), StartupError> {
    let reporting = &config.reporting;
    match reporting.sink {
        SinkKind::None => reporter.clear_sink(),
        SinkKind::Log => reporter.set_sink(LogSink),
        SinkKind::Prometheus => {
            let addr: SocketAddr = config.observability.metrics_address.parse()?;
            init_metrics(addr)?;
            reporter.set_sink(PrometheusSink);
        }
        SinkKind::Http => {
            let endpoint = reporting
                .endpoint
                .as_deref()
                .ok_or(StartupError::MissingEndpoint)?
                .parse()?;
            let sink = HttpSink::new(
                endpoint,
                reporting.bearer_token.clone(),
                Duration::from_secs(reporting.timeout_secs),
            )?;
            tracing::info!(endpoint = %sink.endpoint(), "Reporting to collector");
            reporter.set_sink(sink);
        }
    }

    tracing::info!(
        sink = ?reporting.sink,
        period_ms = reporter.period().as_millis() as u64,
        "Reporting configured"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_sink_requires_endpoint() {
        let reporter = MetricsReporter::new(Duration::from_secs(1));
        let mut config = ProxyConfig::default();
        config.reporting.sink = SinkKind::Http;

        let err = configure_sink(&reporter, &config).unwrap_err();
        assert!(matches!(err, StartupError::MissingEndpoint));

        config.reporting.endpoint = Some("http://collector:9000/stats".to_string());
        assert!(configure_sink(&reporter, &config).is_ok());
    }

    #[test]
    fn log_and_none_sinks_configure() {
        let reporter = MetricsReporter::new(Duration::from_secs(1));
        let mut config = ProxyConfig::default();
        assert!(configure_sink(&reporter, &config).is_ok());

        config.reporting.sink = SinkKind::None;
        assert!(configure_sink(&reporter, &config).is_ok());
    }
}
