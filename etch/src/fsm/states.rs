use std::fmt::Debug;

use etch_core::{CachedDocument, UpstreamResponse};
use tracing::Span;

use crate::exchange::ProxyResponse;

/// Final classification of one pass through the engine.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A complete document to offer to the store.
    Fresh {
        /// Response to serve and store.
        response: ProxyResponse,
        /// Lines of the cached prefix the document extends.
        previous_lines: usize,
    },
    /// The cached document served unchanged; nothing to store.
    Reused(ProxyResponse),
    /// An upstream response served without caching.
    Passthrough(ProxyResponse),
}

impl FetchOutcome {
    /// Response to hand to the client.
    pub fn response(&self) -> &ProxyResponse {
        match self {
            FetchOutcome::Fresh { response, .. }
            | FetchOutcome::Reused(response)
            | FetchOutcome::Passthrough(response) => response,
        }
    }
}

/// Engine states.
pub(crate) enum State {
    /// Looking up the cached prefix.
    Initial,
    /// No usable cache: fetching the whole document.
    PlainAttempt,
    /// Asking for the bytes past the cached prefix.
    RangedAttempt { cached: CachedDocument },
    /// Checking a partial response against the cached prefix.
    Verify {
        cached: CachedDocument,
        response: UpstreamResponse,
    },
    /// The continuation was rejected; fetching the whole document once more.
    FullReFetch { fallback: Option<ProxyResponse> },
    /// Classification finished.
    Accepted(FetchOutcome),
}

impl State {
    /// Span the state's work runs in.
    pub(crate) fn span(&self, parent: &Span) -> Span {
        match self {
            State::Initial => tracing::debug_span!(parent: parent, "fsm.Initial"),
            State::PlainAttempt => tracing::debug_span!(parent: parent, "fsm.PlainAttempt"),
            State::RangedAttempt { cached } => tracing::debug_span!(
                parent: parent,
                "fsm.RangedAttempt",
                cached_len = cached.len()
            ),
            State::Verify { .. } => tracing::debug_span!(parent: parent, "fsm.Verify"),
            State::FullReFetch { .. } => tracing::debug_span!(parent: parent, "fsm.FullReFetch"),
            State::Accepted(_) => tracing::debug_span!(parent: parent, "fsm.Accepted"),
        }
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Initial => f.write_str("State::Initial"),
            State::PlainAttempt => f.write_str("State::PlainAttempt"),
            State::RangedAttempt { .. } => f.write_str("State::RangedAttempt"),
            State::Verify { .. } => f.write_str("State::Verify"),
            State::FullReFetch { .. } => f.write_str("State::FullReFetch"),
            State::Accepted(_) => f.write_str("State::Accepted"),
        }
    }
}
