//! TCP listener binding.
//!
//! # Responsibilities
//! - Parse configured bind addresses, including the short ":port" form
//! - Bind the plain-HTTP listener

use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Bind address could not be parsed.
    #[error("invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddrParseError,
    },

    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[from] std::io::Error),
}

/// Parse a bind address. ":6996" binds all IPv4 interfaces.
pub fn parse_bind_address(address: &str) -> Result<SocketAddr, AddrParseError> {
    let address = address.trim();
    if address.starts_with(':') {
        format!("0.0.0.0{address}").parse()
    } else {
        address.parse()
    }
}

/// Bind a TCP listener on the configured address.
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse_bind_address(address).map_err(|source| ListenerError::Address {
        address: address.to_string(),
        source,
    })?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_binds_all_interfaces() {
        let addr = parse_bind_address(":6996").unwrap();
        assert_eq!(addr, "0.0.0.0:6996".parse().unwrap());
    }

    #[test]
    fn full_addresses_pass_through() {
        assert_eq!(
            parse_bind_address("127.0.0.1:8080").unwrap(),
            "127.0.0.1:8080".parse().unwrap()
        );
        assert!(parse_bind_address("[::1]:8080").is_ok());
        assert!(parse_bind_address("localhost").is_err());
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
