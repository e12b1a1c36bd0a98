//! Error types for the store module.

use thiserror::Error;

/// Errors raised while persisting or loading state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored value is not a valid scene collection.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
