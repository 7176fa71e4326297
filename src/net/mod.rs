//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured bind address
//!     → listener.rs (parse, bind plain TCP)
//!     → tls.rs (optional: load cert/key for the HTTPS listener)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently by axum-server
//! - Certificate material is checked before binding

pub mod listener;
pub mod tls;
