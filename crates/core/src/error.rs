//! Unified error types for precache.
//!
//! Display strings carry a stable code prefix so log lines can be grepped
//! by failure class.

use tokio_rusqlite::rusqlite;

/// Unified error types for the interception cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., storing a non-success response).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Origin unreachable, connection reset, or timed out.
    #[error("TRANSPORT_FAILURE: {0}")]
    Transport(String),

    /// Origin answered with a non-success status.
    #[error("ORIGIN_ERROR: status {status} for {url}")]
    Origin { status: u16, url: String },

    /// Origin response exceeded the configured body limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Writing a captured response into the store failed.
    #[error("PERSIST_FAILURE: {0}")]
    Persist(String),

    /// A manifest entry could not be fetched during install.
    #[error("PRECACHE_FAILED: {path}: {reason}")]
    Precache { path: String, reason: String },

    /// A lifecycle transition was requested from the wrong state.
    #[error("LIFECYCLE_ERROR: {0}")]
    Lifecycle(String),
}

impl Error {
    /// Whether the error belongs to the "origin did not give us a usable
    /// response" class that strategies recover from locally.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Origin { .. } | Error::FetchTooLarge(_))
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
        Error::InvalidInput(format!("malformed header capture: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Transport("network error: https://example.com/".to_string());
        assert!(err.to_string().starts_with("TRANSPORT_FAILURE"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_origin_error_display() {
        let err = Error::Origin { status: 502, url: "https://example.com/api".into() };
        assert_eq!(err.to_string(), "ORIGIN_ERROR: status 502 for https://example.com/api");
    }

    #[test]
    fn test_fetch_failure_classes() {
        assert!(Error::Transport("connection refused".into()).is_fetch_failure());
        assert!(Error::Origin { status: 404, url: String::new() }.is_fetch_failure());
        assert!(Error::FetchTooLarge("too big".into()).is_fetch_failure());
        assert!(!Error::Persist("disk full".into()).is_fetch_failure());
        assert!(!Error::InvalidInput("x".into()).is_fetch_failure());
    }
}
