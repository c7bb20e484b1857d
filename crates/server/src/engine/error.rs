//! Engine error taxonomy.

use hoard_core::FileId;
use hoard_metadata::MetadataError;
use hoard_storage::StorageError;
use thiserror::Error;

/// Errors reported by blob engine operations.
///
/// Substrate errors are translated at the engine boundary; callers never
/// see `StorageError` or `MetadataError` directly.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage backend is not ready, try again shortly")]
    NotReady,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("file not found: {0}")]
    NotFound(FileId),

    #[error("file {id} is corrupt: {reason}")]
    CorruptRecord { id: FileId, reason: String },

    #[error("storage backend failure: {0}")]
    BackendFailure(String),
}

impl BlobError {
    /// Stable code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::InvalidInput(_) => "invalid_input",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::NotFound(_) => "not_found",
            Self::CorruptRecord { .. } => "corrupt_record",
            Self::BackendFailure(_) => "backend_failure",
        }
    }

    pub(crate) fn corrupt(id: FileId, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id,
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for BlobError {
    fn from(err: StorageError) -> Self {
        Self::BackendFailure(err.to_string())
    }
}

impl From<MetadataError> for BlobError {
    fn from(err: MetadataError) -> Self {
        Self::BackendFailure(err.to_string())
    }
}

impl From<hoard_core::Error> for BlobError {
    fn from(err: hoard_core::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Result type for engine operations.
pub type BlobResult<T> = std::result::Result<T, BlobError>;
