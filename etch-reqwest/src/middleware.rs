//! Etch middleware for reqwest-middleware.

use std::sync::Arc;

use async_trait::async_trait;
use etch::{
    BroadcastConcurrencyManager, ConcurrencyManager, ContentStore, Etch, FetchError,
    ProxyResponse, RequestTemplate,
};
use http::{Extensions, Method, Uri};
use reqwest::{Request, Response};
use reqwest_middleware::{Error, Middleware, Next, Result};
use tracing::debug;

use crate::upstream::ReqwestUpstream;

/// Incremental caching middleware for reqwest-middleware.
///
/// GET requests are served through the shared [`Etch`] engine; every other request
/// is passed down the chain untouched.
///
/// # Type Parameters
///
/// * `S` - Content store (e.g. `etch_fs::FsStore`)
/// * `C` - Request deduplicator
pub struct EtchMiddleware<S, C = BroadcastConcurrencyManager<ProxyResponse>> {
    etch: Arc<Etch<S, C>>,
}

impl<S, C> EtchMiddleware<S, C> {
    /// Create a middleware over a shared engine.
    ///
    /// Keep a clone of the `Arc` to subscribe to events or purge entries.
    pub fn new(etch: Arc<Etch<S, C>>) -> Self {
        Self { etch }
    }

    /// The engine behind this middleware.
    pub fn etch(&self) -> &Arc<Etch<S, C>> {
        &self.etch
    }
}

impl<S, C> From<Etch<S, C>> for EtchMiddleware<S, C> {
    fn from(etch: Etch<S, C>) -> Self {
        Self::new(Arc::new(etch))
    }
}

impl<S, C> Clone for EtchMiddleware<S, C> {
    fn clone(&self) -> Self {
        Self {
            etch: self.etch.clone(),
        }
    }
}

#[async_trait]
impl<S, C> Middleware for EtchMiddleware<S, C>
where
    S: ContentStore + 'static,
    C: ConcurrencyManager<ProxyResponse> + 'static,
{
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let Some(template) = template_for(&req) else {
            debug!(method = %req.method(), url = %req.url(), "not cacheable, passing through");
            return next.run(req, extensions).await;
        };

        let upstream =
            ReqwestUpstream::new(next, extensions.clone()).with_timeout(req.timeout().copied());
        let response = self
            .etch
            .handle(&template, upstream)
            .await
            .map_err(|error| match error {
                FetchError::Upstream(error) => error,
                other => Error::Middleware(anyhow::Error::new(other)),
            })?;

        Ok(response.map(reqwest::Body::from).into())
    }
}

fn template_for(req: &Request) -> Option<RequestTemplate> {
    if req.method() != Method::GET || req.body().is_some() {
        return None;
    }
    let uri: Uri = req.url().as_str().parse().ok()?;
    RequestTemplate::new(
        req.method().clone(),
        uri,
        req.version(),
        req.headers().clone(),
    )
}
