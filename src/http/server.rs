//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router catching every path
//! - Wire up middleware (tracing, request timeout)
//! - Serve plain HTTP or HTTPS with graceful shutdown
//! - Hand each request to the tracing transport

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::InvalidHeaderName, uri::InvalidUri, HeaderName, Request, Uri},
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::transport::TracingTransport;
use crate::observability::trace::Sampler;
use crate::reporting::MetricsReporter;

/// Time in-flight requests get to finish once shutdown starts (HTTPS listener).
const TLS_DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream target: {0}")]
    InvalidTarget(#[from] InvalidUri),

    #[error("invalid trace header name: {0}")]
    InvalidTraceHeader(#[from] InvalidHeaderName),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<TracingTransport>,
}

/// HTTP server for the tracing proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server reporting into `reporter`.
    pub fn new(config: ProxyConfig, reporter: Arc<MetricsReporter>) -> Result<Self, ServerError> {
        let target: Uri = config.upstream.target.parse()?;
        let trace_header = HeaderName::from_bytes(config.trace.header.as_bytes())?;

        let transport = TracingTransport::new(
            target,
            trace_header,
            Sampler::new(config.trace.sample_fraction),
            reporter,
            config.upstream.connect_timeout(),
        );

        let state = AppState {
            transport: Arc::new(transport),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(config.upstream.request_timeout())),
            )
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target = %self.config.upstream.target,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(
            address = %addr,
            target = %self.config.upstream.target,
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            shutdown_handle.graceful_shutdown(Some(TLS_DRAIN_GRACE));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Forward every request through the tracing transport.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.transport.round_trip(request, Some(addr)).await
}
