//! Unified error types for vowkeep.
//!
//! Transport-level failures (`Network`, `Timeout`) are the signal the
//! strategy layer keys its fallback behavior off; an HTTP error status is
//! not an `Error`, it comes back as a regular response.

use tokio_rusqlite::rusqlite;

/// Unified error type for the vowkeep crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database operation failed.
    #[error("storage error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("storage error: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid or unresolvable URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A stored record could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// No queued mutation with the given id.
    #[error("mutation not found: {0}")]
    MutationNotFound(String),

    /// The origin could not be reached at the transport level.
    #[error("network error: {0}")]
    Network(String),

    /// The origin did not answer within the configured deadline.
    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

impl Error {
    /// Whether this error means the origin was unreachable (as opposed to
    /// a local storage or encoding problem). Unreachable-origin errors are
    /// the ones that divert reads to cache and writes to the queue.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
