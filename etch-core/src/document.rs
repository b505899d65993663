//! Cached document snapshot.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Upstream last-modification time recorded with a cached document.
pub type Freshness = DateTime<Utc>;

/// Snapshot of one stored resource: its bytes and the freshness they were written with.
///
/// Content and freshness always come from the same read; a store never hands out a
/// document whose timestamp belongs to a different write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDocument {
    content: Bytes,
    freshness: Freshness,
}

impl CachedDocument {
    /// Creates a document snapshot.
    pub fn new(content: impl Into<Bytes>, freshness: Freshness) -> Self {
        Self {
            content: content.into(),
            freshness,
        }
    }

    /// Stored bytes.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Freshness recorded by the last successful write.
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Length of the stored content in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the stored content is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Last stored byte, used to validate a range continuation.
    pub fn last_byte(&self) -> Option<u8> {
        self.content.last().copied()
    }

    /// Offset of the one-byte overlap requested from upstream.
    ///
    /// `None` for an empty document: there is nothing to overlap with.
    pub fn continuation_offset(&self) -> Option<usize> {
        self.content.len().checked_sub(1)
    }

    /// Number of record boundaries (line breaks) in the content.
    pub fn line_count(&self) -> usize {
        line_count(&self.content)
    }

    /// Consumes the snapshot, returning its parts.
    pub fn into_parts(self) -> (Bytes, Freshness) {
        (self.content, self.freshness)
    }
}

/// Counts `\n` record boundaries in `content`.
pub fn line_count(content: &[u8]) -> usize {
    content.iter().filter(|byte| **byte == b'\n').count()
}
