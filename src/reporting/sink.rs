//! Destinations for per-window statistics.
//!
//! # Responsibilities
//! - Define the `StatsSink` boundary the reporter dispatches to
//! - Provide the built-in sinks: log, prometheus, http, closure adapter
//!
//! # Design Decisions
//! - `receive` returns a boxed future so HTTP sinks can await I/O while the
//!   trait stays object safe
//! - A sink owns its failure handling; the reporter only logs the error

use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

use crate::reporting::reducer::InflightStats;

/// Errors a sink can report back to the dispatch site.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Stats could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The collector could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("collector rejected stats with status {status}")]
    Rejected { status: u16 },

    /// Failure reported by a user-supplied receiver.
    #[error("{0}")]
    Receiver(String),
}

/// Consumer of per-window summaries.
pub trait StatsSink: Send + Sync {
    /// Receive one window's statistics. Called once per window, detached
    /// from the timer loop.
    fn receive(&self, stats: InflightStats) -> BoxFuture<'_, Result<(), SinkError>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Adapter turning a closure into a sink.
pub struct FnSink<F> {
    f: F,
}

impl<F> FnSink<F>
where
    F: Fn(InflightStats) -> Result<(), SinkError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> StatsSink for FnSink<F>
where
    F: Fn(InflightStats) -> Result<(), SinkError> + Send + Sync,
{
    fn receive(&self, stats: InflightStats) -> BoxFuture<'_, Result<(), SinkError>> {
        future::ready((self.f)(stats)).boxed()
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// Logs every window as a JSON line at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatsSink for LogSink {
    fn receive(&self, stats: InflightStats) -> BoxFuture<'_, Result<(), SinkError>> {
        let result = serde_json::to_string(&stats).map(|body| {
            tracing::info!(
                window = stats.window_index,
                requests = stats.request_count,
                avg_response_secs = stats.average_response_duration_seconds,
                stats = %body,
                "Window stats"
            );
        });
        future::ready(result.map_err(SinkError::from)).boxed()
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Publishes each window through the `metrics` facade.
///
/// Pair with `observability::metrics::init_metrics` to expose a Prometheus
/// scrape endpoint. Without an installed recorder every update is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl StatsSink for PrometheusSink {
    fn receive(&self, stats: InflightStats) -> BoxFuture<'_, Result<(), SinkError>> {
        metrics::counter!("trace_proxy_windows_total").increment(1);
        metrics::gauge!("trace_proxy_window_index").set(stats.window_index as f64);
        metrics::gauge!("trace_proxy_window_requests").set(stats.request_count as f64);
        metrics::gauge!("trace_proxy_window_avg_response_seconds")
            .set(stats.average_response_duration_seconds);

        // Classes missing from this window are reset, not left at the last value.
        for class in 1u16..=5 {
            let rate = stats
                .status_class_rate_percent
                .get(&class)
                .copied()
                .unwrap_or(0.0);
            metrics::gauge!("trace_proxy_window_status_rate_percent", "class" => format!("{class}xx"))
                .set(rate);
        }

        future::ready(Ok(())).boxed()
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}

/// POSTs each window as JSON to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: url::Url,
    bearer_token: Option<String>,
}

impl HttpSink {
    pub fn new(
        endpoint: url::Url,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trace-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            bearer_token,
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

impl StatsSink for HttpSink {
    fn receive(&self, stats: InflightStats) -> BoxFuture<'_, Result<(), SinkError>> {
        async move {
            let mut request = self.client.post(self.endpoint.clone()).json(&stats);
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::Rejected {
                    status: status.as_u16(),
                });
            }

            tracing::debug!(
                window = stats.window_index,
                endpoint = %self.endpoint,
                "Stats delivered"
            );
            Ok(())
        }
        .boxed()
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
