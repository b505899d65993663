use std::fmt::Display;

use etch_backend::{ContentStore, DeleteStatus};
use etch_core::{
    CacheEvent, CachedDocument, RequestContext, Upstream, UpstreamRequest, UpstreamResponse,
};
use http::{HeaderValue, StatusCode};
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::{
    config::Settings,
    error::FetchError,
    events::EventBroadcaster,
    exchange::{CacheStatus, ProxyResponse, RequestTemplate},
    fsm::states::{FetchOutcome, State},
    verify::{EmptyPartial, Verification, verify},
};

/// Drives one inbound request through the incremental fetch protocol.
///
/// The engine issues at most two upstream requests: a plain or ranged attempt, and
/// one full re-fetch when the range is rejected or the overlap byte does not match.
pub(crate) struct FetchEngine<'a, S, U> {
    ctx: &'a RequestContext,
    store: &'a S,
    events: &'a EventBroadcaster,
    settings: &'a Settings,
    template: &'a RequestTemplate,
    upstream: &'a mut U,
}

impl<'a, S, U, E> FetchEngine<'a, S, U>
where
    S: ContentStore,
    U: Upstream<UpstreamRequest, Response = Result<UpstreamResponse, E>> + Send,
    E: Display + Send,
{
    pub(crate) fn new(
        ctx: &'a RequestContext,
        store: &'a S,
        events: &'a EventBroadcaster,
        settings: &'a Settings,
        template: &'a RequestTemplate,
        upstream: &'a mut U,
    ) -> Self {
        Self {
            ctx,
            store,
            events,
            settings,
            template,
            upstream,
        }
    }

    pub(crate) async fn run(mut self) -> Result<FetchOutcome, FetchError<E>> {
        let parent = Span::current();
        let mut state = State::Initial;
        loop {
            let span = state.span(&parent);
            state = match state {
                State::Initial => self.initial().instrument(span).await,
                State::PlainAttempt => self.plain().instrument(span).await?,
                State::RangedAttempt { cached } => self.ranged(cached).instrument(span).await?,
                State::Verify { cached, response } => {
                    self.verify(cached, response).instrument(span).await?
                }
                State::FullReFetch { fallback } => self.refetch(fallback).instrument(span).await?,
                State::Accepted(outcome) => {
                    span.in_scope(|| {
                        debug!(
                            status = %outcome.response().status(),
                            cache = outcome.response().cache_status().as_str(),
                            "response classified"
                        )
                    });
                    return Ok(outcome);
                }
            };
            debug!(next = ?state, "transition");
        }
    }

    async fn initial(&mut self) -> State {
        match self.store.read(self.ctx.resource()).await {
            Ok(cached) if !cached.is_empty() => {
                debug!(len = cached.len(), freshness = %cached.freshness(), "cached prefix found");
                State::RangedAttempt { cached }
            }
            Ok(_) => {
                debug!("cached document is empty");
                State::PlainAttempt
            }
            Err(error) if error.is_not_found() => {
                debug!("nothing cached");
                State::PlainAttempt
            }
            Err(error) => {
                warn!(%error, "store read failed, fetching whole document");
                State::PlainAttempt
            }
        }
    }

    async fn plain(&mut self) -> Result<State, FetchError<E>> {
        crate::metrics::record_upstream_request("plain");
        let response = self.call(self.template.plain()).await?;
        Ok(State::Accepted(self.whole(response, CacheStatus::Miss)))
    }

    async fn ranged(&mut self, cached: CachedDocument) -> Result<State, FetchError<E>> {
        crate::metrics::record_upstream_request("ranged");
        let response = self.call(self.template.continuation(&cached)).await?;
        let status = response.status();
        debug!(%status, "continuation answered");

        let next = match status {
            StatusCode::OK => {
                debug!("upstream ignored the range, replacing document");
                State::Accepted(self.whole(response, CacheStatus::Miss))
            }
            StatusCode::PARTIAL_CONTENT => State::Verify { cached, response },
            StatusCode::NOT_MODIFIED => {
                State::Accepted(FetchOutcome::Reused(self.reuse(cached, response)))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                debug!("range rejected, cached copy is longer than upstream");
                State::FullReFetch { fallback: None }
            }
            status
                if status == self.settings.retired && self.settings.serve_cached_when_retired =>
            {
                let mut reused = self.reuse(cached, response);
                annotate_original_status(&mut reused, status, self.settings);
                State::Accepted(FetchOutcome::Reused(reused))
            }
            _ => State::Accepted(FetchOutcome::Passthrough(self.passthrough(response))),
        };
        Ok(next)
    }

    async fn verify(
        &mut self,
        cached: CachedDocument,
        response: UpstreamResponse,
    ) -> Result<State, FetchError<E>> {
        let partial = response.body().clone();
        match verify(&cached, &partial) {
            Err(EmptyPartial) => {
                warn!("partial response carries no overlap byte");
                Err(FetchError::EmptyPartial)
            }
            Ok(Verification::Continues(merged)) => {
                debug!(appended = partial.len() - 1, "continuation verified");
                let mut response = ProxyResponse::from_upstream(response, CacheStatus::Append);
                response.set_status(StatusCode::OK);
                response.replace_body(merged);
                Ok(State::Accepted(FetchOutcome::Fresh {
                    response,
                    previous_lines: cached.line_count(),
                }))
            }
            Ok(Verification::Mismatch { expected, found }) => {
                warn!(?expected, found, "cached prefix diverged from upstream, dropping it");
                crate::metrics::record_consistency_failure();
                self.drop_cached().await;
                Ok(State::FullReFetch {
                    fallback: Some(ProxyResponse::from_upstream(response, CacheStatus::Bypass)),
                })
            }
        }
    }

    async fn refetch(&mut self, fallback: Option<ProxyResponse>) -> Result<State, FetchError<E>> {
        crate::metrics::record_upstream_request("refetch");
        match self.upstream.call(self.template.plain()).await {
            Ok(response) => Ok(State::Accepted(self.whole(response, CacheStatus::Refetch))),
            Err(error) => match fallback {
                Some(stale) => {
                    warn!(%error, "re-fetch failed, serving the original partial response");
                    Ok(State::Accepted(FetchOutcome::Passthrough(stale)))
                }
                None => {
                    error!(%error, "re-fetch failed");
                    Err(FetchError::Upstream(error))
                }
            },
        }
    }

    async fn call(&mut self, request: UpstreamRequest) -> Result<UpstreamResponse, FetchError<E>> {
        self.upstream.call(request).await.map_err(|error| {
            error!(%error, "upstream request failed");
            FetchError::Upstream(error)
        })
    }

    /// Classifies a response to an unconditional request.
    fn whole(&self, response: UpstreamResponse, status: CacheStatus) -> FetchOutcome {
        if response.status() == StatusCode::OK {
            FetchOutcome::Fresh {
                response: ProxyResponse::from_upstream(response, status),
                previous_lines: 0,
            }
        } else {
            FetchOutcome::Passthrough(self.passthrough(response))
        }
    }

    fn passthrough(&self, response: UpstreamResponse) -> ProxyResponse {
        let status = response.status();
        let mut response = ProxyResponse::from_upstream(response, CacheStatus::Bypass);
        if status == self.settings.retired {
            debug!(%status, remapped = %self.settings.retired_remap, "resource retired upstream");
            response.set_status(self.settings.retired_remap);
            annotate_original_status(&mut response, status, self.settings);
        }
        response
    }

    fn reuse(&self, cached: CachedDocument, response: UpstreamResponse) -> ProxyResponse {
        let mut reused = ProxyResponse::from_upstream(response, CacheStatus::Hit);
        reused.set_status(StatusCode::OK);
        let (content, _) = cached.into_parts();
        reused.replace_body(content);
        reused
    }

    async fn drop_cached(&self) {
        let id = self.ctx.resource();
        match self.store.delete(id).await {
            Ok(DeleteStatus::Deleted) => {
                info!("cache entry deleted");
                self.events.publish(CacheEvent::delete(id.clone()));
            }
            Ok(DeleteStatus::Missing) => debug!("cache entry already gone"),
            Err(error) => warn!(%error, "failed to delete diverged cache entry"),
        }
    }
}

fn annotate_original_status(response: &mut ProxyResponse, status: StatusCode, settings: &Settings) {
    response.headers_mut().insert(
        settings.original_status_header.clone(),
        HeaderValue::from(status.as_u16()),
    );
}
