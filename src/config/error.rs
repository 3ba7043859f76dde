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
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be at least 1")]
    InvalidPoolSize,

    #[error("Invalid provider API base URL")]
    InvalidProviderUrl,

    #[error("Invalid webhook secret format")]
    InvalidWebhookSecret,

    #[error("Invalid from email address")]
    InvalidFromEmail,

    #[error("Lock timeout must be between 1 and 60 seconds")]
    InvalidLockTimeout,

    #[error("Sweep interval must be at least 1 second")]
    InvalidSweepInterval,

    #[error("Sweep batch size must be at least 1")]
    InvalidSweepBatchSize,
}
