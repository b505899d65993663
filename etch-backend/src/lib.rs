#![doc = include_str!("../README.md")]

mod backend;
mod error;

pub use backend::{BackendResult, ContentStore, ResourceStream};
pub use error::BackendError;

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// The entry existed and was removed.
    Deleted,
    /// There was nothing to remove.
    Missing,
}
