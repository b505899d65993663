//! Upstream wrapper for reqwest-middleware's Next type.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use etch_core::{Upstream, UpstreamRequest, UpstreamResponse};
use http::Extensions;
use reqwest_middleware::{Error, Next, Result};

/// Upstream that bridges reqwest-middleware's `Next<'a>` to etch's `Upstream` trait.
///
/// Every engine request runs through the rest of the middleware chain with its own
/// copy of the inbound extensions, and the response body is collected before it is
/// handed back.
pub struct ReqwestUpstream<'a> {
    next: Next<'a>,
    extensions: Extensions,
    timeout: Option<Duration>,
}

impl<'a> ReqwestUpstream<'a> {
    /// Create a new upstream wrapper.
    pub fn new(next: Next<'a>, extensions: Extensions) -> Self {
        Self {
            next,
            extensions,
            timeout: None,
        }
    }

    /// Applies a per-request timeout to every upstream request.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<'a> Upstream<UpstreamRequest> for ReqwestUpstream<'a> {
    type Response = Result<UpstreamResponse>;
    type Future = Pin<Box<dyn Future<Output = Self::Response> + Send + 'a>>;

    fn call(&mut self, req: UpstreamRequest) -> Self::Future {
        let next = self.next.clone();
        let mut extensions = self.extensions.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let request = into_reqwest(req, timeout)?;
            let response = next.run(request, &mut extensions).await?;

            let status = response.status();
            let version = response.version();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            let mut collected = http::Response::new(body);
            *collected.status_mut() = status;
            *collected.version_mut() = version;
            *collected.headers_mut() = headers;
            Ok(collected)
        })
    }
}

fn into_reqwest(req: UpstreamRequest, timeout: Option<Duration>) -> Result<reqwest::Request> {
    let (parts, ()) = req.into_parts();
    let url = reqwest::Url::parse(&parts.uri.to_string())
        .map_err(|e| Error::Middleware(anyhow::anyhow!("invalid upstream url: {e}")))?;
    let mut request = reqwest::Request::new(parts.method, url);
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers;
    *request.timeout_mut() = timeout;
    Ok(request)
}
