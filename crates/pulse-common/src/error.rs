//! Error types for Pulse

use thiserror::Error;

/// Result type alias for Pulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// Main error type for Pulse
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}. Check your database connection settings.")]
    Database(#[from] sqlx::Error),

    #[error("Lake error: {0}")]
    Lake(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("A load run is already in progress for this warehouse")]
    AlreadyRunning,

    #[error("Invalid partition key '{0}': expected 'YYYY-MM-DD/channel'")]
    InvalidPartitionKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl PulseError {
    /// Create a lake error
    pub fn lake(msg: impl Into<String>) -> Self {
        Self::Lake(msg.into())
    }

    /// Create a manifest error
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
