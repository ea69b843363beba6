//! Error types for ScrapeWatch

use thiserror::Error;

/// Result type alias using ScrapeWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ScrapeWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// The record store could not be read (any page of a fetch)
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    /// The monitoring sink rejected the batch or could not be reached
    #[error("Metrics publish failed: {0}")]
    PublishFailed(String),

    /// The operator channel could not be notified
    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    /// A run exceeded its deadline
    #[error("Run timed out: {0}")]
    Timeout(String),

    /// Database error outside of record reads (migrations, health checks)
    #[error("Database error: {0}")]
    Database(String),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    /// Create a notification error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::NotifyFailed(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error aborts a pipeline run.
    ///
    /// Notification failures are reported but never unwind a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotifyFailed(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
