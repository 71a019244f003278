//! Error types for trilan-core

use thiserror::Error;

/// Result type alias using trilan-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the local store and the import/export layer
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed import payload; nothing was written
    #[error("Invalid import data: {0}")]
    Validation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A thread panicked while holding the store connection
    #[error("Local store is unavailable after a panic in another thread")]
    LockPoisoned,
}
