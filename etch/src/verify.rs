//! Overlap check between a cached prefix and a partial response.

use bytes::{Bytes, BytesMut};
use etch_core::CachedDocument;

/// Result of checking a partial body against the cached prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The partial body continues the cached document; holds the merged whole.
    Continues(Bytes),
    /// The upstream serves a different stream than the one cached.
    Mismatch {
        /// Last cached byte.
        expected: Option<u8>,
        /// First byte of the partial body.
        found: u8,
    },
}

/// The partial body had no byte to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyPartial;

/// Checks that `partial` starts with the last byte of `cached` and merges the two.
pub fn verify(cached: &CachedDocument, partial: &Bytes) -> Result<Verification, EmptyPartial> {
    let found = *partial.first().ok_or(EmptyPartial)?;
    let expected = cached.last_byte();
    if expected != Some(found) {
        return Ok(Verification::Mismatch { expected, found });
    }

    let suffix = partial.slice(1..);
    if suffix.is_empty() {
        return Ok(Verification::Continues(cached.content().clone()));
    }
    let mut merged = BytesMut::with_capacity(cached.len() + suffix.len());
    merged.extend_from_slice(cached.content());
    merged.extend_from_slice(&suffix);
    Ok(Verification::Continues(merged.freeze()))
}
