//! Error types for btstats-core

use thiserror::Error;

/// Main error type for the btstats-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested action is not in the registry
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A pipeline stage could not be evaluated against the stored events
    #[error("query execution failed: {0}")]
    Pipeline(String),

    /// Remote service fetch failed or returned a non-2xx status
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A value reached the serializer with no textual form
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A blocking query task was cancelled or panicked
    #[error("task error: {0}")]
    Task(String),
}

impl Error {
    /// Whether the caller, not the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::UnknownAction(_))
    }

    /// Whether the failure came from the remote color service.
    pub fn is_upstream_error(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }
}

/// Result type alias for btstats-core
pub type Result<T> = std::result::Result<T, Error>;
