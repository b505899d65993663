//! Seam between the fetch engine and the HTTP transport.

use std::future::Future;

use bytes::Bytes;

/// Request shape the fetch engine hands to an upstream: headers only, no body.
pub type UpstreamRequest = http::Request<()>;

/// Fully buffered upstream response.
pub type UpstreamResponse = http::Response<Bytes>;

/// Trait for calling the origin server a resource lives on.
///
/// Implementations are transport adapters: they send the request built by the fetch
/// engine and return the response with its body collected. The engine may call the
/// same upstream more than once per inbound request (a continuation attempt followed
/// by one full re-fetch).
///
/// # Examples
///
/// ```rust,ignore
/// use etch_core::{Upstream, UpstreamRequest, UpstreamResponse};
/// use std::future::Ready;
///
/// struct Fixed(UpstreamResponse);
///
/// impl Upstream<UpstreamRequest> for Fixed {
///     type Response = Result<UpstreamResponse, std::convert::Infallible>;
///     type Future = Ready<Self::Response>;
///
///     fn call(&mut self, _req: UpstreamRequest) -> Self::Future {
///         std::future::ready(Ok(clone_response(&self.0)))
///     }
/// }
/// ```
pub trait Upstream<Req> {
    /// Result of one upstream exchange.
    type Response;

    /// Future resolving to the exchange result.
    type Future: Future<Output = Self::Response> + Send;

    /// Sends `req` to the origin.
    fn call(&mut self, req: Req) -> Self::Future;
}
