//! Configuration validation.
//!
//! Serde handles syntax; this module checks values: addresses parse,
//! limits are non-zero, the template root exists, the log filter is valid.
//! Every violation is reported, not just the first.

use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::GasConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("server.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("server.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("templates.root `{0}` is not a directory")]
    MissingTemplateRoot(String),

    #[error("observability.log_level `{0}` is not a valid filter")]
    InvalidLogLevel(String),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &GasConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.server.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if !Path::new(&config.templates.root).is_dir() {
        errors.push(ValidationError::MissingTemplateRoot(
            config.templates.root.clone(),
        ));
    }
    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    // Only checked when it will actually be bound.
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
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
