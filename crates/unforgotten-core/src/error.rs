//! Error types for unforgotten-core

use thiserror::Error;

/// Result type alias using unforgotten-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in unforgotten-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Network unavailability, timeout, or unexpected backend response
    #[error("Network error: {0}")]
    Network(String),

    /// Session invalid or rejected; surfaced to the account layer, never retried here
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Local commit failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a failed operation is worth retrying on the next sync attempt.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
