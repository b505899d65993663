use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use etch_backend::{BackendResult, ContentStore, DeleteStatus, ResourceStream};
use etch_core::{
    CacheEvent, RequestContext, ResourceId, Upstream, UpstreamRequest, UpstreamResponse,
};
use http::Method;
use tracing::{Instrument, debug, info};

use crate::{
    concurrency::{
        BroadcastConcurrencyManager, ConcurrencyDecision, ConcurrencyManager, Leadership,
    },
    config::{EtchConfig, Settings},
    error::{ConfigError, FetchError},
    events::{EventBroadcaster, Subscription},
    exchange::{ProxyResponse, RequestTemplate},
    fsm::{FetchEngine, FetchOutcome},
    writer::CacheWriter,
};

const EMPTY_PARTIAL_MESSAGE: &str = "Reading response: partial content is empty";

/// Incremental-fetch caching engine.
///
/// Every inbound GET runs through the same fixed stages: the deduplicator elects one
/// leader per resource, the leader drives the fetch state machine, a complete
/// document is offered to the store, and the final response is shared with every
/// caller that waited on the leader.
///
/// ```no_run
/// use etch::{Etch, EtchConfig};
/// use etch_fs::FsStore;
///
/// let store = FsStore::builder().root("/var/cache/etch").build()?;
/// let etch = Etch::builder(store).config(EtchConfig::default()).build()?;
/// let events = etch.subscribe();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Etch<S, C = BroadcastConcurrencyManager<ProxyResponse>> {
    store: Arc<S>,
    concurrency: C,
    events: EventBroadcaster,
    settings: Settings,
}

impl<S> Etch<S> {
    /// Starts building an engine over `store`.
    pub fn builder(store: S) -> EtchBuilder<S, BroadcastConcurrencyManager<ProxyResponse>> {
        EtchBuilder {
            store: Arc::new(store),
            config: EtchConfig::default(),
            concurrency: BroadcastConcurrencyManager::new(),
        }
    }
}

impl<S, C> Etch<S, C>
where
    S: ContentStore,
    C: ConcurrencyManager<ProxyResponse>,
{
    /// Serves one inbound request described by `template`, fetching through `upstream`.
    ///
    /// Transport failures are returned as errors; callers that waited on a failed
    /// leader repeat the whole pipeline with their own `upstream`.
    pub async fn handle<U, E>(
        &self,
        template: &RequestTemplate,
        mut upstream: U,
    ) -> Result<http::Response<Bytes>, FetchError<E>>
    where
        U: Upstream<UpstreamRequest, Response = Result<UpstreamResponse, E>> + Send,
        E: Display + Send,
    {
        if template.method() != Method::GET {
            return Err(FetchError::InvalidRequest(format!(
                "{} requests are not cached",
                template.method()
            )));
        }
        let ctx = RequestContext::new(template.resource().clone());
        let span = ctx.span();
        let response = self
            .respond(&ctx, template, &mut upstream)
            .instrument(span)
            .await?;
        Ok(response.into_http(Some(&self.settings.cache_status_header)))
    }

    async fn respond<U, E>(
        &self,
        ctx: &RequestContext,
        template: &RequestTemplate,
        upstream: &mut U,
    ) -> Result<ProxyResponse, FetchError<E>>
    where
        U: Upstream<UpstreamRequest, Response = Result<UpstreamResponse, E>> + Send,
        E: Display + Send,
    {
        let id = ctx.resource();
        loop {
            match self.concurrency.check(id) {
                ConcurrencyDecision::Await(waiting) => {
                    let span = tracing::debug_span!("etch.dedup");
                    if let Some(response) = waiting.instrument(span).await {
                        debug!("served by in-flight fetch");
                        return Ok(response);
                    }
                    debug!("in-flight fetch ended without a result, retrying");
                }
                ConcurrencyDecision::Proceed => {
                    let leadership = Leadership::new(&self.concurrency, id.clone());
                    return match self.fetch(ctx, template, upstream).await {
                        Ok(response) => {
                            leadership.finish(Some(response.clone()));
                            Ok(response)
                        }
                        Err(FetchError::EmptyPartial) => {
                            leadership.finish(None);
                            Ok(ProxyResponse::internal_error(EMPTY_PARTIAL_MESSAGE))
                        }
                        Err(error) => {
                            leadership.finish(None);
                            Err(error)
                        }
                    };
                }
            }
        }
    }

    async fn fetch<U, E>(
        &self,
        ctx: &RequestContext,
        template: &RequestTemplate,
        upstream: &mut U,
    ) -> Result<ProxyResponse, FetchError<E>>
    where
        U: Upstream<UpstreamRequest, Response = Result<UpstreamResponse, E>> + Send,
        E: Display + Send,
    {
        let engine = FetchEngine::new(
            ctx,
            self.store.as_ref(),
            &self.events,
            &self.settings,
            template,
            upstream,
        );
        match engine.run().await? {
            FetchOutcome::Fresh {
                response,
                previous_lines,
            } => {
                CacheWriter::new(
                    self.store.as_ref(),
                    &self.events,
                    &self.settings.cacheable_content_types,
                )
                .store(ctx.resource(), &response, previous_lines)
                .await;
                Ok(response)
            }
            FetchOutcome::Reused(response) | FetchOutcome::Passthrough(response) => Ok(response),
        }
    }

    /// Deletes the cached copy of `id`, announcing the deletion to subscribers.
    pub async fn purge(&self, id: &ResourceId) -> BackendResult<DeleteStatus> {
        let status = self.store.delete(id).await?;
        if status == DeleteStatus::Deleted {
            info!(resource = %id, "cache entry purged");
            self.events.publish(CacheEvent::delete(id.clone()));
        }
        Ok(status)
    }

    /// Lists every cached resource.
    pub fn resources(&self) -> ResourceStream {
        self.store.enumerate()
    }

    /// Registers a subscriber for cache-change events.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Event broadcaster, for unsubscribing by handle.
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Underlying content store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// Builder for [`Etch`].
pub struct EtchBuilder<S, C> {
    store: Arc<S>,
    config: EtchConfig,
    concurrency: C,
}

impl<S, C> EtchBuilder<S, C> {
    /// Engine configuration. Defaults to [`EtchConfig::default`].
    pub fn config(mut self, config: EtchConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the request deduplicator.
    pub fn concurrency<NewC>(self, concurrency: NewC) -> EtchBuilder<S, NewC>
    where
        NewC: ConcurrencyManager<ProxyResponse>,
    {
        EtchBuilder {
            store: self.store,
            config: self.config,
            concurrency,
        }
    }

    /// Validates the configuration and creates the engine.
    pub fn build(self) -> Result<Etch<S, C>, ConfigError> {
        let settings = Settings::try_from(&self.config)?;
        Ok(Etch {
            store: self.store,
            concurrency: self.concurrency,
            events: EventBroadcaster::new(settings.event_buffer),
            settings,
        })
    }
}
