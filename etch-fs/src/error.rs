use thiserror::Error;

/// Errors that can occur when building an [`FsStore`](crate::FsStore).
#[derive(Debug, Error)]
pub enum FsStoreError {
    /// The root directory could not be created or inspected.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The provided configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
