//! Distributed trace context propagation.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests
//! - Mint a proxy span and decide sampling
//! - Render the context for the upstream request header
//!
//! # Header Format
//! ```text
//! X-Cloud-Trace-Context: TRACE_ID/SPAN_ID;o=OPTIONS
//!   TRACE_ID  32 hex digits
//!   SPAN_ID   decimal u64 (optional)
//!   OPTIONS   bit 0 set = sampled (optional)
//! ```
//!
//! # Design Decisions
//! - A valid incoming trace id is always kept; its sampling flag wins
//! - Missing or malformed headers start a new trace, never fail the request
//! - Span export is out of scope; spans live as `tracing` spans only

use std::str::FromStr;

use axum::http::{HeaderMap, HeaderName};
use rand::Rng;
use thiserror::Error;

/// Default propagation header.
pub const TRACE_HEADER: &str = "x-cloud-trace-context";

const TRACE_ID_LEN: usize = 32;

/// Errors parsing a trace propagation header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceHeaderError {
    #[error("trace header is empty")]
    Empty,

    #[error("invalid trace id {0:?}")]
    InvalidTraceId(String),

    #[error("invalid span id {0:?}")]
    InvalidSpanId(String),

    #[error("invalid trace options {0:?}")]
    InvalidOptions(String),
}

/// Probabilistic sampling decision for new traces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    fraction: f64,
}

impl Sampler {
    /// Create a sampler keeping `fraction` of new traces, clamped to `[0, 1]`.
    pub fn new(fraction: f64) -> Self {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        Self { fraction }
    }

    pub fn always() -> Self {
        Self::new(1.0)
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn should_sample(&self) -> bool {
        if self.fraction >= 1.0 {
            true
        } else if self.fraction <= 0.0 {
            false
        } else {
            rand::thread_rng().gen_bool(self.fraction)
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::always()
    }
}

/// Header fields as received, before the proxy mints its own span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTrace {
    pub trace_id: String,
    pub parent_span_id: Option<u64>,
    pub sampled: Option<bool>,
}

impl FromStr for IncomingTrace {
    type Err = TraceHeaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TraceHeaderError::Empty);
        }

        let (ids, options) = match value.split_once(';') {
            Some((ids, options)) => (ids, Some(options)),
            None => (value, None),
        };
        let (trace_id, span_id) = match ids.split_once('/') {
            Some((trace, span)) => (trace, Some(span)),
            None => (ids, None),
        };

        if trace_id.len() != TRACE_ID_LEN
            || !trace_id.bytes().all(|b| b.is_ascii_hexdigit())
            || trace_id.bytes().all(|b| b == b'0')
        {
            return Err(TraceHeaderError::InvalidTraceId(trace_id.to_string()));
        }

        let parent_span_id = match span_id {
            Some(span) => Some(
                span.parse::<u64>()
                    .map_err(|_| TraceHeaderError::InvalidSpanId(span.to_string()))?,
            ),
            None => None,
        };

        let sampled = match options {
            Some(options) => {
                let flags = options
                    .strip_prefix("o=")
                    .and_then(|o| o.parse::<u32>().ok())
                    .ok_or_else(|| TraceHeaderError::InvalidOptions(options.to_string()))?;
                Some(flags & 1 == 1)
            }
            None => None,
        };

        Ok(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_span_id,
            sampled,
        })
    }
}

/// Trace context of one proxied request, as the proxy's own span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: String,
    span_id: u64,
    parent_span_id: Option<u64>,
    sampled: bool,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new_root(sampler: &Sampler) -> Self {
        Self {
            trace_id: new_trace_id(),
            span_id: new_span_id(),
            parent_span_id: None,
            sampled: sampler.should_sample(),
        }
    }

    /// Continue an incoming trace with a fresh span.
    pub fn child_of(incoming: IncomingTrace, sampler: &Sampler) -> Self {
        Self {
            sampled: incoming.sampled.unwrap_or_else(|| sampler.should_sample()),
            trace_id: incoming.trace_id,
            span_id: new_span_id(),
            parent_span_id: incoming.parent_span_id,
        }
    }

    /// Extract from request headers, starting a new trace when the header is
    /// absent or unusable.
    pub fn from_headers(headers: &HeaderMap, header: &HeaderName, sampler: &Sampler) -> Self {
        let Some(value) = headers.get(header) else {
            return Self::new_root(sampler);
        };

        match value
            .to_str()
            .map_err(|_| TraceHeaderError::InvalidTraceId("<non-ascii>".to_string()))
            .and_then(IncomingTrace::from_str)
        {
            Ok(incoming) => Self::child_of(incoming, sampler),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed trace header");
                Self::new_root(sampler)
            }
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<u64> {
        self.parent_span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Header value announcing this span to the upstream.
    pub fn header_value(&self) -> String {
        format!("{}/{};o={}", self.trace_id, self.span_id, u8::from(self.sampled))
    }
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> u64 {
    fastrand::u64(1..)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TRACE: &str = "105445aa7843bc8bf206b12000100000";

    #[test]
    fn parses_full_header() {
        let incoming: IncomingTrace = format!("{TRACE}/1;o=1").parse().unwrap();
        assert_eq!(incoming.trace_id, TRACE);
        assert_eq!(incoming.parent_span_id, Some(1));
        assert_eq!(incoming.sampled, Some(true));
    }

    #[test]
    fn parses_partial_headers() {
        let only_trace: IncomingTrace = TRACE.parse().unwrap();
        assert_eq!(only_trace.parent_span_id, None);
        assert_eq!(only_trace.sampled, None);

        let unsampled: IncomingTrace = format!("{TRACE}/42;o=0").parse().unwrap();
        assert_eq!(unsampled.sampled, Some(false));
    }

    #[test]
    fn normalizes_trace_id_case() {
        let incoming: IncomingTrace = TRACE.to_uppercase().parse().unwrap();
        assert_eq!(incoming.trace_id, TRACE);
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!("".parse::<IncomingTrace>(), Err(TraceHeaderError::Empty));
        assert!(matches!(
            "abc/1;o=1".parse::<IncomingTrace>(),
            Err(TraceHeaderError::InvalidTraceId(_))
        ));
        assert!(matches!(
            "00000000000000000000000000000000".parse::<IncomingTrace>(),
            Err(TraceHeaderError::InvalidTraceId(_))
        ));
        assert!(matches!(
            format!("{TRACE}/x").parse::<IncomingTrace>(),
            Err(TraceHeaderError::InvalidSpanId(_))
        ));
        assert!(matches!(
            format!("{TRACE}/1;sampled").parse::<IncomingTrace>(),
            Err(TraceHeaderError::InvalidOptions(_))
        ));
    }

    #[test]
    fn child_keeps_trace_and_upstream_decision() {
        let incoming: IncomingTrace = format!("{TRACE}/7;o=0").parse().unwrap();
        let ctx = TraceContext::child_of(incoming, &Sampler::always());
        assert_eq!(ctx.trace_id(), TRACE);
        assert_eq!(ctx.parent_span_id(), Some(7));
        assert_ne!(ctx.span_id(), 0);
        assert!(!ctx.is_sampled());
    }

    #[test]
    fn header_round_trips_through_parser() {
        let ctx = TraceContext::new_root(&Sampler::always());
        assert_eq!(ctx.trace_id().len(), TRACE_ID_LEN);

        let incoming: IncomingTrace = ctx.header_value().parse().unwrap();
        assert_eq!(incoming.trace_id, ctx.trace_id());
        assert_eq!(incoming.parent_span_id, Some(ctx.span_id()));
        assert_eq!(incoming.sampled, Some(true));
    }

    #[test]
    fn from_headers_falls_back_to_new_trace() {
        let name = HeaderName::from_static(TRACE_HEADER);
        let mut headers = HeaderMap::new();
        headers.insert(name.clone(), HeaderValue::from_static("garbage"));

        let ctx = TraceContext::from_headers(&headers, &name, &Sampler::new(0.0));
        assert_ne!(ctx.trace_id(), "garbage");
        assert_eq!(ctx.parent_span_id(), None);
        assert!(!ctx.is_sampled());

        headers.insert(name.clone(), HeaderValue::from_str(&format!("{TRACE}/3;o=1")).unwrap());
        let ctx = TraceContext::from_headers(&headers, &name, &Sampler::new(0.0));
        assert_eq!(ctx.trace_id(), TRACE);
        assert!(ctx.is_sampled());
    }

    #[test]
    fn sampler_clamps_fraction() {
        assert_eq!(Sampler::new(4.0).fraction(), 1.0);
        assert_eq!(Sampler::new(-1.0).fraction(), 0.0);
        assert_eq!(Sampler::new(f64::NAN).fraction(), 0.0);
        assert!(Sampler::always().should_sample());
        assert!(!Sampler::new(0.0).should_sample());
    }
}
