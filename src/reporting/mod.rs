//! Traffic reporting subsystem.
//!
//! # Data Flow
//! ```text
//! http::transport (one exchange per proxied request)
//!     → event.rs (request marker on arrival, response marker on completion)
//!     → buffer.rs (mutex-guarded append, drained once per window)
//!     → reporter.rs (timer loop: tick → drain → spawn dispatch)
//!     → reducer.rs (batch → InflightStats)
//!     → sink.rs (log / prometheus / http / closure)
//! ```
//!
//! # Design Decisions
//! - The request path only ever touches the buffer's short critical section
//! - Reduction and dispatch run detached; the timer loop never awaits them
//! - Windows are wall-clock delimited and numbered; sinks reorder if they care
//! - Sink failures stop at the sink boundary (logged, never retried)

pub mod buffer;
pub mod event;
pub mod reducer;
pub mod reporter;
pub mod sink;

pub use buffer::EventBuffer;
pub use event::Event;
pub use reducer::{reduce, InflightStats};
pub use reporter::{MetricsReporter, ReporterError, DEFAULT_PERIOD};
pub use sink::{FnSink, HttpSink, LogSink, PrometheusSink, SinkError, StatsSink};
