//! Request templates and engine responses.

use bytes::Bytes;
use etch_core::{
    CachedDocument, ResourceId, UpstreamRequest, UpstreamResponse, format_http_date,
};
use http::{
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version,
    header::{
        ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, IF_MODIFIED_SINCE, IF_NONE_MATCH,
        IF_RANGE, RANGE, TRANSFER_ENCODING,
    },
};

/// How the response to a client was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// Fetched whole, nothing was cached.
    #[default]
    Miss,
    /// Served from the cache without new content.
    Hit,
    /// Cached prefix extended with a verified continuation.
    Append,
    /// Fetched whole again after the continuation was rejected.
    Refetch,
    /// Passed through without touching the cache.
    Bypass,
}

impl CacheStatus {
    /// Header value for the status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Miss => "MISS",
            CacheStatus::Hit => "HIT",
            CacheStatus::Append => "APPEND",
            CacheStatus::Refetch => "REFETCH",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// Headers the engine owns on upstream requests.
///
/// Client conditionals and ranges are replaced by the engine's own, and encodings are
/// refused because the overlap check works on identity bytes.
const ENGINE_HEADERS: [HeaderName; 5] =
    [RANGE, IF_MODIFIED_SINCE, IF_RANGE, IF_NONE_MATCH, ACCEPT_ENCODING];

/// Outbound request template derived from an inbound GET.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    resource: ResourceId,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestTemplate {
    /// Builds a template from inbound request parts.
    ///
    /// Returns `None` when the URI names no host.
    pub fn new(method: Method, uri: Uri, version: Version, mut headers: HeaderMap) -> Option<Self> {
        let resource = ResourceId::from_uri(&uri)?;
        for name in ENGINE_HEADERS {
            headers.remove(name);
        }
        Some(Self {
            resource,
            method,
            uri,
            version,
            headers,
        })
    }

    /// Builds a template from any `http::Request`, ignoring its body.
    pub fn from_request<B>(request: &http::Request<B>) -> Option<Self> {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.version(),
            request.headers().clone(),
        )
    }

    /// Resource the request is for.
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Plain request for the whole document.
    pub fn plain(&self) -> UpstreamRequest {
        self.build(HeaderMap::new())
    }

    /// Request for the bytes past `cached`, overlapping its last byte.
    ///
    /// Falls back to a plain request for an empty document.
    pub fn continuation(&self, cached: &CachedDocument) -> UpstreamRequest {
        let Some(offset) = cached.continuation_offset() else {
            return self.plain();
        };
        let mut extra = HeaderMap::new();
        if let Ok(range) = HeaderValue::from_str(&format!("bytes={offset}-")) {
            extra.insert(RANGE, range);
        }
        if let Ok(since) = HeaderValue::from_str(&format_http_date(cached.freshness())) {
            extra.insert(IF_MODIFIED_SINCE, since);
        }
        self.build(extra)
    }

    fn build(&self, extra: HeaderMap) -> UpstreamRequest {
        let mut request = http::Request::new(());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        request.headers_mut().extend(extra);
        request
    }
}

/// Buffered response produced by the engine and shared with deduplicated callers.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    cache_status: CacheStatus,
}

impl ProxyResponse {
    /// Wraps an upstream response.
    pub fn from_upstream(response: UpstreamResponse, cache_status: CacheStatus) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
            cache_status,
        }
    }

    /// Plain-text error response generated by the proxy itself.
    pub fn internal_error(message: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        let mut response = Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            version: Version::HTTP_11,
            headers,
            body: Bytes::new(),
            cache_status: CacheStatus::Bypass,
        };
        response.replace_body(Bytes::from(message.into()));
        response
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// How the response was produced.
    pub fn cache_status(&self) -> CacheStatus {
        self.cache_status
    }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Swaps in a new body and rewrites the framing headers to match it.
    pub(crate) fn replace_body(&mut self, body: Bytes) {
        self.headers.remove(TRANSFER_ENCODING);
        self.headers.remove(CONTENT_RANGE);
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
    }

    /// Converts into an `http::Response`, reporting the cache status under `header`.
    pub fn into_http(self, header: Option<&HeaderName>) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        if let Some(header) = header {
            response.headers_mut().insert(
                header.clone(),
                HeaderValue::from_static(self.cache_status.as_str()),
            );
        }
        response
    }
}
