//! Tracing reverse proxy sidecar library.
//!
//! Forwards every request to a single upstream with trace context injected,
//! and reports per-window traffic statistics to a pluggable sink.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod reporting;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use reporting::{InflightStats, MetricsReporter};
