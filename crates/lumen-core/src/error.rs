//! Error types for lumen.

use thiserror::Error;

/// Result type alias using lumen's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lumen operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested album is missing from the photo library
    #[error("Album not found: {album} (available: {available})")]
    AlbumNotFound { album: String, available: String },

    /// Caption generation failed
    #[error("Caption error: {0}")]
    Caption(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Reverse geocoding failed
    #[error("Geocode error: {0}")]
    Geocode(String),

    /// Vector store is unreadable or failed its integrity check
    #[error("Store corrupted: {0}")]
    Corrupted(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Remote service temporarily unavailable (timeouts, 429, 5xx)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ) || is_sqlite_busy(e),
            _ => false,
        }
    }
}

fn is_sqlite_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            let message = db.message();
            message.contains("database is locked") || message.contains("database is busy")
        }
        _ => false,
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let transient = e.is_timeout()
            || e.is_connect()
            || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error());
        if transient {
            Error::Unavailable(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
