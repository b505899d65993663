#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod error;
mod lock;
mod store;

pub use error::FsStoreError;
pub use store::{FsStore, FsStoreBuilder};
