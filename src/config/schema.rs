//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::trace::TRACE_HEADER;
use crate::reporting::DEFAULT_PERIOD;

/// Root configuration for the tracing proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The single upstream every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Trace propagation and sampling.
    pub trace: TraceConfig,

    /// Per-window traffic reporting.
    pub reporting: ReportingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6996" or ":6996").
    pub bind_address: String,

    /// Optional TLS configuration. Serves HTTPS when set.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6996".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Target base URL (e.g., "http://localhost:6060"). Required.
    pub target: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time for request/response in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Trace propagation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Header carrying the trace context in both directions.
    pub header: String,

    /// Fraction of new traces marked as sampled, in [0, 1].
    pub sample_fraction: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            header: TRACE_HEADER.to_string(),
            sample_fraction: 1.0,
        }
    }
}

/// Where window statistics go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Drain and discard.
    None,
    /// Log each window as JSON.
    #[default]
    Log,
    /// Publish gauges on the Prometheus exporter.
    Prometheus,
    /// POST each window to `endpoint`.
    Http,
}

impl std::str::FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "log" => Ok(Self::Log),
            "prometheus" => Ok(Self::Prometheus),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown sink {other:?} (none, log, prometheus, http)")),
        }
    }
}

/// Reporting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Window length in milliseconds. Zero selects the default (60s).
    pub period_ms: u64,

    /// Sink receiving each window.
    pub sink: SinkKind,

    /// Collector URL for the http sink.
    pub endpoint: Option<String>,

    /// Bearer token sent to the collector.
    pub bearer_token: Option<String>,

    /// Per-delivery timeout for the http sink in seconds.
    pub timeout_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD.as_millis() as u64,
            sink: SinkKind::default(),
            endpoint: None,
            bearer_token: None,
            timeout_secs: 10,
        }
    }
}

impl ReportingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus exporter bind address, used by the prometheus sink.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
