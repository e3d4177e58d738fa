use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum BusError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An envelope or payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The append did not complete within the configured write timeout.
    #[error("Publishing to topic {topic} timed out after {after:?}")]
    Timeout { topic: String, after: Duration },

    /// The partition does not exist for this topic.
    #[error("Invalid partition {partition} for topic {topic}")]
    InvalidPartition { topic: String, partition: u32 },

    /// The log refused the operation.
    #[error("Event log unavailable: {0}")]
    Unavailable(String),
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, BusError>;
