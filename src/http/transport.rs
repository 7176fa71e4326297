//! Tracing transport: the proxy's request interceptor.
//!
//! # Responsibilities
//! - Resolve the trace context of every proxied request
//! - Inject the proxy span into the upstream trace header
//! - Forward to the single upstream target
//! - Emit request and response events into the metrics reporter
//!
//! # Design Decisions
//! - Event submission is a buffer push; nothing here waits on reporting
//! - The response event is guaranteed by a drop guard, so requests cut short
//!   by the timeout layer or a client disconnect are still reported
//! - Upstream failures become 502 for the client and the 500 sentinel in the
//!   reported event

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response, StatusCode, Uri, Version},
    response::IntoResponse,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tracing::Instrument;

use crate::http::headers::{append_forwarded_for, rewrite_uri, strip_hop_by_hop};
use crate::observability::trace::{Sampler, TraceContext};
use crate::reporting::{Event, MetricsReporter};

/// Forwards requests to the upstream target with trace propagation.
pub struct TracingTransport {
    client: Client<HttpConnector, Body>,
    target: Uri,
    trace_header: HeaderName,
    sampler: Sampler,
    reporter: Arc<MetricsReporter>,
}

impl TracingTransport {
    pub fn new(
        target: Uri,
        trace_header: HeaderName,
        sampler: Sampler,
        reporter: Arc<MetricsReporter>,
        connect_timeout: Duration,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            target,
            trace_header,
            sampler,
            reporter,
        }
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    /// Forward one request and return the upstream response.
    pub async fn round_trip(&self, request: Request<Body>, client: Option<SocketAddr>) -> Response<Body> {
        let ctx = TraceContext::from_headers(request.headers(), &self.trace_header, &self.sampler);
        let span = tracing::info_span!(
            "proxy",
            trace_id = %ctx.trace_id(),
            span_id = ctx.span_id(),
            sampled = ctx.is_sampled(),
        );

        self.forward(request, client, ctx).instrument(span).await
    }

    async fn forward(
        &self,
        request: Request<Body>,
        client: Option<SocketAddr>,
        ctx: TraceContext,
    ) -> Response<Body> {
        let exchange = Exchange::begin(Arc::clone(&self.reporter), ctx.trace_id());
        let (mut parts, body) = request.into_parts();

        tracing::debug!(method = %parts.method, uri = %parts.uri, "Proxying request");

        parts.uri = match rewrite_uri(&self.target, &parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot rewrite request URI");
                exchange.fail(e.to_string());
                return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
            }
        };
        // The pooled upstream connection speaks HTTP/1.1 regardless of the client.
        parts.version = Version::HTTP_11;

        strip_hop_by_hop(&mut parts.headers);
        if let Some(addr) = client {
            append_forwarded_for(&mut parts.headers, addr.ip());
        }
        match HeaderValue::from_str(&ctx.header_value()) {
            Ok(value) => {
                parts.headers.insert(self.trace_header.clone(), value);
            }
            Err(e) => tracing::warn!(error = %e, "Trace header not injected"),
        }

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let status = response.status();
                exchange.complete(status.as_u16());
                tracing::debug!(status = %status, "Upstream responded");

                into_client_response(response)
            }
            Err(e) => {
                tracing::error!(error = %e, "Upstream error");
                exchange.fail(e.to_string());
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

fn into_client_response(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// One request/response pair as seen by the reporter.
///
/// Submits the request marker on creation and exactly one response marker:
/// from `complete`, from `fail`, or on drop if neither ran.
struct Exchange {
    reporter: Arc<MetricsReporter>,
    trace_id: String,
    start: SystemTime,
    finished: bool,
}

impl Exchange {
    fn begin(reporter: Arc<MetricsReporter>, trace_id: &str) -> Self {
        let start = SystemTime::now();
        reporter.add_event(Event::request(trace_id, start));
        Self {
            reporter,
            trace_id: trace_id.to_string(),
            start,
            finished: false,
        }
    }

    fn complete(mut self, status: u16) {
        self.finished = true;
        let trace_id = std::mem::take(&mut self.trace_id);
        self.reporter
            .add_event(Event::response(trace_id, status, self.start, SystemTime::now()));
    }

    fn fail(mut self, error: String) {
        self.finished = true;
        self.record_failure(error);
    }

    fn record_failure(&mut self, error: String) {
        let trace_id = std::mem::take(&mut self.trace_id);
        self.reporter
            .add_event(Event::failure(trace_id, self.start, SystemTime::now(), error));
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(trace_id = %self.trace_id, "Request abandoned before upstream responded");
            self.record_failure("request abandoned".to_string());
        }
    }
}
