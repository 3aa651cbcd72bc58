//! Errors raised while loading or checking configuration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// A loaded value that the service cannot run with
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid log format '{0}' (expected pretty or json)")]
    InvalidLogFormat(String),

    #[error("Connection queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Quota warning threshold must be below the monthly cap")]
    WarningAboveCap,

    #[error("Maximum message length must be at least 1")]
    InvalidMessageLength,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,
}
