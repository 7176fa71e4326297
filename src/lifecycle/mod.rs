//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs, startup.rs):
//!     Load config → Validate → Configure sink → Start reporter → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close reporter → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then reporter, then listeners
//! - Reporter dispatches already in flight are not awaited on exit

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
