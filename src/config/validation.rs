//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the upstream target and collector URLs
//! - Validate value ranges (timeouts > 0, fraction in [0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - A zero reporting period is not an error; the reporter substitutes its default

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{ProxyConfig, SinkKind};
use crate::net::listener::parse_bind_address;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("upstream target is required")]
    MissingTarget,

    #[error("upstream target {target:?} is invalid: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("bind address {0:?} is invalid")]
    InvalidBindAddress(String),

    #[error("TLS {0} path is empty")]
    EmptyTlsPath(&'static str),

    #[error("trace header {0:?} is not a valid header name")]
    InvalidTraceHeader(String),

    #[error("sample fraction {0} is outside [0, 1]")]
    InvalidSampleFraction(f64),

    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("http sink requires reporting.endpoint")]
    MissingSinkEndpoint,

    #[error("reporting endpoint {0:?} is not an http(s) URL")]
    InvalidSinkEndpoint(String),

    #[error("metrics address {0:?} is invalid")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_target(&config.upstream.target) {
        errors.push(e);
    }

    if parse_bind_address(&config.listener.bind_address).is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("certificate"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key"));
        }
    }

    if HeaderName::from_bytes(config.trace.header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidTraceHeader(config.trace.header.clone()));
    }

    let fraction = config.trace.sample_fraction;
    if !(0.0..=1.0).contains(&fraction) {
        errors.push(ValidationError::InvalidSampleFraction(fraction));
    }

    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect"));
    }
    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request"));
    }

    match config.reporting.sink {
        SinkKind::Http => match &config.reporting.endpoint {
            None => errors.push(ValidationError::MissingSinkEndpoint),
            Some(endpoint) => {
                let valid = url::Url::parse(endpoint)
                    .map(|u| matches!(u.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !valid {
                    errors.push(ValidationError::InvalidSinkEndpoint(endpoint.clone()));
                }
                if config.reporting.timeout_secs == 0 {
                    errors.push(ValidationError::ZeroTimeout("reporting"));
                }
            }
        },
        SinkKind::Prometheus => {
            if config.observability.metrics_address.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::InvalidMetricsAddress(
                    config.observability.metrics_address.clone(),
                ));
            }
        }
        SinkKind::None | SinkKind::Log => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_target(target: &str) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::MissingTarget);
    }

    let invalid = |reason: &str| ValidationError::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let url = url::Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid("only http upstreams are supported"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.fragment().is_some() {
        return Err(invalid("fragments are not allowed"));
    }
    Ok(())
}
