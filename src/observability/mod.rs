//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Process:
//!     → logging.rs (structured log events)
//!     → metrics.rs (Prometheus exporter for the reporting sink)
//!
//! Per request:
//!     → trace.rs (trace context in, proxy span out, sampling)
//! ```
//!
//! # Design Decisions
//! - Trace id flows into the request span, the upstream header and the
//!   reporting events
//! - The exporter is only installed when the prometheus sink is selected

pub mod logging;
pub mod metrics;
pub mod trace;

pub use trace::{Sampler, TraceContext, TRACE_HEADER};
