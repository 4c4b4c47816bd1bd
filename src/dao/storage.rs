use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session `{pin}` does not exist")]
    NotFound { pin: String },
    #[error("session `{pin}` already exists")]
    AlreadyExists { pin: String },
    /// The document changed since it was read; the compare-and-swap lost.
    #[error("session `{pin}` was modified concurrently")]
    RevisionConflict { pin: String },
    /// Too many concurrent writers on the same document.
    #[error("gave up updating session `{pin}` after {attempts} conflicting attempts")]
    Contention { pin: String, attempts: u32 },
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
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
