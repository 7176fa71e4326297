//! Tracing reverse proxy sidecar.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                  TRACE PROXY                     │
//!                    │                                                  │
//!  Client Request    │  ┌────────┐   ┌───────────┐   ┌──────────────┐   │
//!  ──────────────────┼─▶│  http  │──▶│ transport │──▶│ hyper client │───┼──▶ Upstream
//!                    │  │ server │   │ trace ctx │   └──────────────┘   │
//!                    │  └────────┘   └─────┬─────┘                      │
//!                    │                     │ events (push only)         │
//!                    │                     ▼                            │
//!                    │  ┌──────────────────────────────────────────┐    │
//!                    │  │ reporting: buffer → tick → reduce → sink │────┼──▶ log / prometheus / http
//!                    │  └──────────────────────────────────────────┘    │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use trace_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig, SinkKind, TlsConfig};
use trace_proxy::http::HttpServer;
use trace_proxy::lifecycle::{signals, startup, Shutdown};
use trace_proxy::net::{listener, tls};
use trace_proxy::observability::logging;
use trace_proxy::reporting::MetricsReporter;

#[derive(Parser, Debug)]
#[command(name = "trace-proxy", version)]
#[command(about = "Reverse proxy sidecar that propagates trace context and reports traffic stats")]
struct Cli {
    /// TOML configuration file. Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// host:port the proxy listens on (":6996" binds all interfaces)
    #[arg(long = "http", value_name = "HOST:PORT")]
    listen: Option<String>,

    /// Upstream target URL, e.g. http://localhost:6060
    #[arg(long)]
    target: Option<String>,

    /// Sampling fraction for new traces, [0, 1]
    #[arg(long)]
    trace_fraction: Option<f64>,

    /// TLS certificate file to serve HTTPS
    #[arg(long)]
    tls_cert: Option<String>,

    /// TLS key file to serve HTTPS
    #[arg(long)]
    tls_key: Option<String>,

    /// Reporting window in milliseconds (0 = 60s default)
    #[arg(long)]
    report_period_ms: Option<u64>,

    /// Stats sink: none, log, prometheus, http
    #[arg(long)]
    sink: Option<SinkKind>,

    /// Collector URL for the http sink
    #[arg(long)]
    sink_endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(target) = &self.target {
            config.upstream.target = target.clone();
        }
        if let Some(fraction) = self.trace_fraction {
            config.trace.sample_fraction = fraction;
        }
        if self.tls_cert.is_some() || self.tls_key.is_some() {
            let existing = config.listener.tls.take();
            let (cert, key) = existing
                .map(|t| (t.cert_path, t.key_path))
                .unwrap_or_default();
            config.listener.tls = Some(TlsConfig {
                cert_path: self.tls_cert.clone().unwrap_or(cert),
                key_path: self.tls_key.clone().unwrap_or(key),
            });
        }
        if let Some(period) = self.report_period_ms {
            config.reporting.period_ms = period;
        }
        if let Some(sink) = self.sink {
            config.reporting.sink = sink;
        }
        if let Some(endpoint) = &self.sink_endpoint {
            config.reporting.endpoint = Some(endpoint.clone());
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability.log_level);
    tracing::info!("trace-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        return Err(ConfigError::Validation(errors).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        target = %config.upstream.target,
        tls = config.listener.tls.is_some(),
        sample_fraction = config.trace.sample_fraction,
        "Configuration loaded"
    );

    // Reporter first, so the first request already has somewhere to go.
    let reporter = Arc::new(MetricsReporter::new(config.reporting.period()));
    startup::configure_sink(&reporter, &config)?;
    let reporter_task = {
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move { reporter.run().await })
    };

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { signals::shutdown_on_signal(&shutdown).await });
    }

    let server = HttpServer::new(config.clone(), Arc::clone(&reporter))?;
    let served = match &config.listener.tls {
        Some(tls_config) => {
            let addr = listener::parse_bind_address(&config.listener.bind_address)?;
            let rustls = tls::load_tls_config(
                Path::new(&tls_config.cert_path),
                Path::new(&tls_config.key_path),
            )
            .await?;
            server.run_tls(addr, rustls, server_shutdown).await
        }
        None => {
            let tcp = listener::bind(&config.listener.bind_address).await?;
            server.run(tcp, server_shutdown).await
        }
    };

    shutdown.trigger();
    if reporter.close().is_err() {
        tracing::debug!("Reporter was already closed");
    }
    if let Err(e) = reporter_task.await {
        tracing::warn!(error = %e, "Reporter task ended abnormally");
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
