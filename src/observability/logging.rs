//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber once per process
//! - Resolve the log level from config, overridable by `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Invalid configured levels fall back to `info` instead of aborting startup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the configured level.
pub fn filter_directive(log_level: &str) -> String {
    let level = match log_level.to_ascii_lowercase().as_str() {
        lvl @ ("trace" | "debug" | "info" | "warn" | "error") => lvl.to_string(),
        _ => "info".to_string(),
    };
    format!("trace_proxy={level},tower_http={level}")
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
