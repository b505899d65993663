use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use etch_core::{CachedDocument, Freshness, ResourceId};
use futures::stream::BoxStream;

use crate::{BackendError, DeleteStatus};

/// Result alias for store operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Lazy sequence of stored identities.
pub type ResourceStream = BoxStream<'static, BackendResult<ResourceId>>;

/// Persistent mapping from resource identity to cached document.
///
/// Implementations serialize mutations of one identity and never let a read observe a
/// half-applied write. Work on different identities must not block each other.
#[async_trait]
pub trait ContentStore: Sync + Send {
    /// Whether an entry exists for `id`.
    async fn exists(&self, id: &ResourceId) -> BackendResult<bool>;

    /// Reads content and freshness as one snapshot.
    ///
    /// Fails with [`BackendError::NotFound`] when there is no entry.
    async fn read(&self, id: &ResourceId) -> BackendResult<CachedDocument>;

    /// Stores `content` only if `freshness` is strictly newer than the stored one.
    ///
    /// A missing entry counts as the oldest possible freshness. Returns whether the
    /// write happened; a stale write is not an error.
    async fn write_if_fresher(
        &self,
        id: &ResourceId,
        content: Bytes,
        freshness: Freshness,
    ) -> BackendResult<bool>;

    /// Removes the entry for `id`. Removing a missing entry succeeds.
    async fn delete(&self, id: &ResourceId) -> BackendResult<DeleteStatus>;

    /// Lists every stored identity.
    fn enumerate(&self) -> ResourceStream;

    /// Returns the name of this store, used in log fields.
    fn name(&self) -> &str {
        "store"
    }
}

#[async_trait]
impl ContentStore for &dyn ContentStore {
    async fn exists(&self, id: &ResourceId) -> BackendResult<bool> {
        (*self).exists(id).await
    }

    async fn read(&self, id: &ResourceId) -> BackendResult<CachedDocument> {
        (*self).read(id).await
    }

    async fn write_if_fresher(
        &self,
        id: &ResourceId,
        content: Bytes,
        freshness: Freshness,
    ) -> BackendResult<bool> {
        (*self).write_if_fresher(id, content, freshness).await
    }

    async fn delete(&self, id: &ResourceId) -> BackendResult<DeleteStatus> {
        (*self).delete(id).await
    }

    fn enumerate(&self) -> ResourceStream {
        (*self).enumerate()
    }

    fn name(&self) -> &str {
        (*self).name()
    }
}

#[async_trait]
impl ContentStore for Box<dyn ContentStore> {
    async fn exists(&self, id: &ResourceId) -> BackendResult<bool> {
        (**self).exists(id).await
    }

    async fn read(&self, id: &ResourceId) -> BackendResult<CachedDocument> {
        (**self).read(id).await
    }

    async fn write_if_fresher(
        &self,
        id: &ResourceId,
        content: Bytes,
        freshness: Freshness,
    ) -> BackendResult<bool> {
        (**self).write_if_fresher(id, content, freshness).await
    }

    async fn delete(&self, id: &ResourceId) -> BackendResult<DeleteStatus> {
        (**self).delete(id).await
    }

    fn enumerate(&self) -> ResourceStream {
        (**self).enumerate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl ContentStore for Arc<dyn ContentStore + Send + 'static> {
    async fn exists(&self, id: &ResourceId) -> BackendResult<bool> {
        (**self).exists(id).await
    }

    async fn read(&self, id: &ResourceId) -> BackendResult<CachedDocument> {
        (**self).read(id).await
    }

    async fn write_if_fresher(
        &self,
        id: &ResourceId,
        content: Bytes,
        freshness: Freshness,
    ) -> BackendResult<bool> {
        (**self).write_if_fresher(id, content, freshness).await
    }

    async fn delete(&self, id: &ResourceId) -> BackendResult<DeleteStatus> {
        (**self).delete(id).await
    }

    fn enumerate(&self) -> ResourceStream {
        (**self).enumerate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
