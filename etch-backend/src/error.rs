//! Error types for store operations.

use etch_core::ResourceId;
use thiserror::Error;

/// Error type for content store operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The resource has no stored entry.
    #[error("resource {0} is not cached")]
    NotFound(ResourceId),

    /// The resource identity cannot be mapped to a storage location.
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    /// Storage I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Internal store error, state or computation error.
    #[error(transparent)]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    /// Whether the error only says the entry is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}
