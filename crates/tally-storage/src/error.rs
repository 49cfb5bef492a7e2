use std::time::Duration;
use tally_common::retry::RetryError;
use tally_common::types::{MetricKind, ValidationError};

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use tally_common::types::MetricKind;
/// use tally_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Gauge,
///     id: "Alloc".to_string(),
/// };
/// assert!(err.is_not_found());
/// assert!(err.to_string().contains("Alloc"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric id has no value for the requested kind.
    #[error("Storage: {kind} '{id}' not found")]
    NotFound { kind: MetricKind, id: String },

    /// A record in the request was malformed; nothing was applied.
    #[error("Storage: invalid metric: {0}")]
    Validation(#[from] ValidationError),

    /// An underlying SQLite error that was not retried.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A database operation that went through the retry executor and failed.
    #[error("Storage: {0}")]
    Retry(#[from] RetryError<rusqlite::Error>),

    #[error("Storage: I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot encoding or decoding failure.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: health check timed out after {0:?}")]
    Timeout(Duration),
}

impl StorageError {
    pub fn not_found(kind: MetricKind, id: &str) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for a read-path miss, which callers treat as a typed probe result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
