//! Error types for the catalog backup core library.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// SQLite primary result code for "database or disk is full".
const SQLITE_FULL: &str = "13";

/// Main error type for the catalog backup library.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure talking to the catalog API
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store has no room left for new data
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Storage backend error
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Whether this error means the local store ran out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::Storage(StorageError::QuotaExceeded(_)))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some(SQLITE_FULL) {
                return Error::Storage(StorageError::QuotaExceeded(db_err.message().to_string()));
            }
        }
        Error::Storage(StorageError::Backend(err.to_string()))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Connection(err.to_string())
    }
}
