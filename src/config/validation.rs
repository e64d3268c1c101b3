//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits sane)
//! - Check the upstream is a plain-HTTP origin the forwarder can reach
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// Smallest buffer that still holds a full content-sniffing sample.
const MIN_BUFFERED_BYTES: usize = 512;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream `{0}` is not a valid URL")]
    InvalidUpstream(String),
    #[error("upstream `{0}` must use the http scheme")]
    UnsupportedUpstreamScheme(String),
    #[error("listen address must not be empty")]
    EmptyListen,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("limits.max_buffered_bytes must be at least 512")]
    BufferTooSmall,
    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.upstream) {
        Ok(url) if url.scheme() != "http" => {
            errors.push(ValidationError::UnsupportedUpstreamScheme(config.upstream.clone()))
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidUpstream(config.upstream.clone()))
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::InvalidUpstream(config.upstream.clone())),
    }

    if config.listen.trim().is_empty() {
        errors.push(ValidationError::EmptyListen);
    }

    let timeouts = [
        ("connect_secs", config.timeouts.connect_secs),
        ("upstream_secs", config.timeouts.upstream_secs),
        ("asset_secs", config.timeouts.asset_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.limits.max_buffered_bytes < MIN_BUFFERED_BYTES {
        errors.push(ValidationError::BufferTooSmall);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
