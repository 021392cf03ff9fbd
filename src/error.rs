//! Error types for Synheart Affect

use thiserror::Error;

/// Errors that can occur while ingesting signals or driving the pipeline
#[derive(Debug, Error)]
pub enum AffectError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid input event: {0}")]
    InvalidEvent(String),

    #[error("Invalid external signal: {0}")]
    InvalidSignal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StoreError),

    #[error("No active session")]
    SessionNotActive,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised by the durable session store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
