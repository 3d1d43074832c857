use std::error::Error;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The stored record is not at the version the write was computed from.
    #[error("session `{id}` is not at version {expected} (stored: {actual:?})")]
    VersionConflict {
        id: Uuid,
        expected: u64,
        /// Version found in the store; `None` when the record is missing or the backend cannot tell.
        actual: Option<u64>,
    },
    /// A record with the same identifier already exists.
    #[error("session `{id}` already exists")]
    AlreadyExists { id: Uuid },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
