//! Freshness-gated persistence of fetched documents.

use chrono::Utc;
use etch_backend::ContentStore;
use etch_core::{CacheEvent, Freshness, ResourceId, parse_http_date};
use http::{
    StatusCode,
    header::{CONTENT_TYPE, LAST_MODIFIED},
};
use tracing::{Instrument, debug, info, warn};

use crate::{events::EventBroadcaster, exchange::ProxyResponse};

/// Outcome of offering a response to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was stored and an update event published.
    Written,
    /// The store already holds an equally fresh or fresher document.
    NotFresher,
    /// The response is not eligible for caching.
    Skipped(&'static str),
    /// The store failed; the failure was logged.
    Failed,
}

/// Writes complete documents into a store and announces successful writes.
pub struct CacheWriter<'a, S> {
    store: &'a S,
    events: &'a EventBroadcaster,
    content_types: &'a [String],
}

impl<'a, S> CacheWriter<'a, S>
where
    S: ContentStore,
{
    /// Creates a writer. An empty `content_types` list accepts any media type.
    pub fn new(store: &'a S, events: &'a EventBroadcaster, content_types: &'a [String]) -> Self {
        Self {
            store,
            events,
            content_types,
        }
    }

    /// Stores `response` for `id` if it is cacheable and fresher than the stored copy.
    ///
    /// `previous_lines` is the line count the new content extends; subscribers use it
    /// to fetch only what they have not seen. Failures never propagate.
    pub async fn store(
        &self,
        id: &ResourceId,
        response: &ProxyResponse,
        previous_lines: usize,
    ) -> WriteOutcome {
        let span = tracing::debug_span!("etch.writer", store = self.store.name());
        let outcome = self
            .write(id, response, previous_lines)
            .instrument(span)
            .await;
        crate::metrics::record_cache_write(match outcome {
            WriteOutcome::Written => "written",
            WriteOutcome::NotFresher => "not_fresher",
            WriteOutcome::Skipped(_) => "skipped",
            WriteOutcome::Failed => "failed",
        });
        outcome
    }

    async fn write(
        &self,
        id: &ResourceId,
        response: &ProxyResponse,
        previous_lines: usize,
    ) -> WriteOutcome {
        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "not caching non-200 response");
            return WriteOutcome::Skipped("status");
        }
        if !self.cacheable_media(response) {
            debug!("not caching response of this content type");
            return WriteOutcome::Skipped("content-type");
        }

        let freshness = freshness_of(response);
        match self
            .store
            .write_if_fresher(id, response.body().clone(), freshness)
            .await
        {
            Ok(true) => {
                info!(bytes = response.body().len(), since = previous_lines, "cache updated");
                self.events.publish(CacheEvent::update(id.clone(), previous_lines));
                WriteOutcome::Written
            }
            Ok(false) => {
                warn!(%freshness, "cached copy is at least as fresh, write skipped");
                WriteOutcome::NotFresher
            }
            Err(error) => {
                warn!(%error, "cache write failed");
                WriteOutcome::Failed
            }
        }
    }

    fn cacheable_media(&self, response: &ProxyResponse) -> bool {
        if self.content_types.is_empty() {
            return true;
        }
        let Some(media) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
        else {
            return false;
        };
        self.content_types.iter().any(|allowed| *allowed == media)
    }
}

/// Upstream `Last-Modified`, or now when it is missing or unparsable.
fn freshness_of(response: &ProxyResponse) -> Freshness {
    response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
        .unwrap_or_else(Utc::now)
}
