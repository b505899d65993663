//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

pub mod spans;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use etch::{
    BackendError, CachedDocument, ContentStore, DeleteStatus, Etch, EtchConfig, Freshness,
    RequestTemplate, ResourceId,
};
use etch_backend::{BackendResult, ResourceStream};
use etch_core::{Upstream, UpstreamRequest, UpstreamResponse, format_http_date};
use futures::stream;
use http::{HeaderMap, Method, StatusCode, Version, header};

pub const URL: &str = "http://toro.2ch.net/book/dat/1363665368.dat";

pub fn resource() -> ResourceId {
    ResourceId::from_uri(&URL.parse().unwrap()).unwrap()
}

pub fn template() -> RequestTemplate {
    RequestTemplate::new(
        Method::GET,
        URL.parse().unwrap(),
        Version::HTTP_11,
        HeaderMap::new(),
    )
    .unwrap()
}

pub fn at(secs: i64) -> Freshness {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn engine(store: TestStore) -> Etch<TestStore> {
    Etch::builder(store).build().unwrap()
}

pub fn engine_with(store: TestStore, config: EtchConfig) -> Etch<TestStore> {
    Etch::builder(store).config(config).build().unwrap()
}

/// In-memory store using DashMap.
#[derive(Clone, Default)]
pub struct TestStore {
    entries: Arc<DashMap<ResourceId, CachedDocument>>,
    fail_reads: Arc<Mutex<bool>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(id: &ResourceId, content: &'static str, freshness: DateTime<Utc>) -> Self {
        let store = Self::new();
        store
            .entries
            .insert(id.clone(), CachedDocument::new(content, freshness));
        store
    }

    pub fn content(&self, id: &ResourceId) -> Option<Bytes> {
        self.entries.get(id).map(|doc| doc.content().clone())
    }

    pub fn document(&self, id: &ResourceId) -> Option<CachedDocument> {
        self.entries.get(id).map(|doc| doc.clone())
    }

    pub fn fail_reads(&self) {
        *self.fail_reads.lock().unwrap() = true;
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }
}

#[async_trait]
impl ContentStore for TestStore {
    async fn exists(&self, id: &ResourceId) -> BackendResult<bool> {
        Ok(self.entries.contains_key(id))
    }

    async fn read(&self, id: &ResourceId) -> BackendResult<CachedDocument> {
        if *self.fail_reads.lock().unwrap() {
            return Err(BackendError::Io(std::io::Error::other("disk on fire")));
        }
        self.entries
            .get(id)
            .map(|doc| doc.clone())
            .ok_or_else(|| BackendError::NotFound(id.clone()))
    }

    async fn write_if_fresher(
        &self,
        id: &ResourceId,
        content: Bytes,
        freshness: Freshness,
    ) -> BackendResult<bool> {
        if *self.fail_writes.lock().unwrap() {
            return Err(BackendError::Io(std::io::Error::other("disk full")));
        }
        let mut entry = self
            .entries
            .entry(id.clone())
            .or_insert_with(|| CachedDocument::new(Bytes::new(), DateTime::<Utc>::MIN_UTC));
        if freshness <= entry.freshness() {
            return Ok(false);
        }
        *entry = CachedDocument::new(content, freshness);
        Ok(true)
    }

    async fn delete(&self, id: &ResourceId) -> BackendResult<DeleteStatus> {
        Ok(match self.entries.remove(id) {
            Some(_) => DeleteStatus::Deleted,
            None => DeleteStatus::Missing,
        })
    }

    fn enumerate(&self) -> ResourceStream {
        let ids: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Ok(entry.key().clone()))
            .collect();
        Box::pin(stream::iter(ids))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub &'static str);

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Upstream request as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub range: Option<String>,
    pub if_modified_since: Option<String>,
}

type Handler =
    dyn Fn(&UpstreamRequest, usize) -> Result<UpstreamResponse, MockError> + Send + Sync;

/// Scripted upstream. The handler gets the request and its zero-based call number.
#[derive(Clone)]
pub struct MockUpstream {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    delay: Duration,
}

impl MockUpstream {
    pub fn new(
        handler: impl Fn(&UpstreamRequest, usize) -> Result<UpstreamResponse, MockError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Upstream<UpstreamRequest> for MockUpstream {
    type Response = Result<UpstreamResponse, MockError>;
    type Future = Pin<Box<dyn Future<Output = Self::Response> + Send>>;

    fn call(&mut self, req: UpstreamRequest) -> Self::Future {
        let value_of = |name: header::HeaderName| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        };
        let recorded = RecordedCall {
            range: value_of(header::RANGE),
            if_modified_since: value_of(header::IF_MODIFIED_SINCE),
        };
        let number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(recorded);
            calls.len() - 1
        };
        let result = (self.handler)(&req, number);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

/// `text/plain` response with an optional `Last-Modified`.
pub fn text(status: StatusCode, body: &'static str, last_modified: Option<Freshness>) -> UpstreamResponse {
    let mut builder = http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::CONTENT_LENGTH, body.len());
    if let Some(date) = last_modified {
        builder = builder.header(header::LAST_MODIFIED, format_http_date(date));
    }
    builder.body(Bytes::from_static(body.as_bytes())).unwrap()
}

pub fn empty(status: StatusCode) -> UpstreamResponse {
    http::Response::builder()
        .status(status)
        .body(Bytes::new())
        .unwrap()
}

pub fn partial(body: &'static str, from: usize, last_modified: Freshness) -> UpstreamResponse {
    let mut response = text(StatusCode::PARTIAL_CONTENT, body, Some(last_modified));
    let end = from + body.len() - 1;
    response.headers_mut().insert(
        header::CONTENT_RANGE,
        format!("bytes {from}-{end}/{}", end + 1).parse().unwrap(),
    );
    response
}
