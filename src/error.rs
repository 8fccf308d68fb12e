//! Error types shared across layers.

use thiserror::Error;

/// Errors that abort startup or surface from storage and sweep operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error while binding a listener or serving connections.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Stored attachment metadata could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Retention window does not yield a representable cutoff instant.
    #[error("retention of {days} days is out of range")]
    RetentionOutOfRange { days: i64 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
