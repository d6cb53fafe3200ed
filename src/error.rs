//! Error types for the companion conversation engine

use thiserror::Error;

/// Result type alias for companion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the conversation engine
///
/// Provider failures are deliberately absent: they are absorbed by
/// [`ProviderGateway`](crate::providers::ProviderGateway) and reported as a
/// [`GenerationOutcome`](crate::providers::GenerationOutcome) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Database error (pool checkout, migration bookkeeping)
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No async runtime to schedule background work on
    #[error("runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means durable storage was unavailable
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Sqlite(_))
    }
}
