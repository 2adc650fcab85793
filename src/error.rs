use thiserror::Error;

use crate::domain::StateConflict;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum AlgexError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Messaging errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // State machine errors
    #[error(transparent)]
    StateConflict(#[from] StateConflict),

    // Partition errors
    #[error("Partition unavailable for {account_id}/{symbol}: {reason}")]
    PartitionUnavailable {
        account_id: String,
        symbol: String,
        reason: String,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AlgexError
pub type Result<T> = std::result::Result<T, AlgexError>;
