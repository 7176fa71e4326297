//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, timeout and trace layers)
//!     → transport.rs (trace context, request event, forward, response event)
//!     → headers.rs (hop-by-hop stripping, X-Forwarded-For, URI rewrite)
//!     → Send upstream response to client
//! ```

pub mod headers;
pub mod server;
pub mod transport;

pub use server::{HttpServer, ServerError};
pub use transport::TracingTransport;
