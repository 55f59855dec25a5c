//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Retry schedule must contain at least one delay")]
    EmptyRetrySchedule,

    #[error("Retry delays must be at least one day")]
    ZeroRetryDelay,

    #[error("Retry delays must be in ascending order")]
    UnsortedRetrySchedule,

    #[error("cancel_after_days ({cancel}) must exceed suspend_after_days ({suspend})")]
    CancelBeforeSuspend { suspend: u32, cancel: u32 },

    #[error("Sweep interval must be at least one second")]
    InvalidSweepInterval,

    #[error("Sweep batch limit must be at least one")]
    InvalidBatchLimit,

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
