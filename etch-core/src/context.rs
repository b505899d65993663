//! Per-request logging context.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Span;

use crate::ResourceId;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Logging context carried through every stage of one inbound request.
///
/// Each context gets a process-wide, monotonically increasing session number so that
/// interleaved log lines of concurrent requests can be told apart.
#[derive(Debug, Clone)]
pub struct RequestContext {
    session: u64,
    resource: ResourceId,
}

impl RequestContext {
    /// Creates a context with the next session number.
    pub fn new(resource: ResourceId) -> Self {
        Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            resource,
        }
    }

    /// Session number of the request.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Resource the request is for.
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Root span of the request.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "etch.request",
            resource = %self.resource,
            session = self.session,
        )
    }
}
