//! Integration tests for EtchMiddleware using wiremock.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use etch::{CacheEvent, ContentStore, Etch, ResourceId};
use etch_core::parse_http_date;
use etch_fs::FsStore;
use etch_reqwest::EtchMiddleware;
use futures::future::join_all;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tempfile::TempDir;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAT_PATH: &str = "/book/dat/1363665368.dat";
const FIRST_MODIFIED: &str = "Tue, 19 Mar 2013 04:00:00 GMT";
const SECOND_MODIFIED: &str = "Tue, 19 Mar 2013 05:00:00 GMT";

struct Harness {
    _dir: TempDir,
    etch: Arc<Etch<FsStore>>,
    client: ClientWithMiddleware,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::builder().root(dir.path()).build().unwrap();
    let etch = Arc::new(Etch::builder(store).build().unwrap());
    let client = ClientBuilder::new(Client::new())
        .with(EtchMiddleware::new(etch.clone()))
        .build();
    Harness {
        _dir: dir,
        etch,
        client,
    }
}

fn dat_url(server: &MockServer) -> String {
    format!("{}{DAT_PATH}", server.uri())
}

fn dat_id(server: &MockServer) -> ResourceId {
    ResourceId::from_uri(&dat_url(server).parse().unwrap()).unwrap()
}

async fn seed(etch: &Etch<FsStore>, id: &ResourceId, content: &'static str) {
    let written = etch
        .store()
        .write_if_fresher(
            id,
            Bytes::from_static(content.as_bytes()),
            parse_http_date(FIRST_MODIFIED).unwrap(),
        )
        .await
        .unwrap();
    assert!(written);
}

async fn cached(etch: &Etch<FsStore>, id: &ResourceId) -> Option<Bytes> {
    etch.store()
        .read(id)
        .await
        .ok()
        .map(|doc| doc.content().clone())
}

fn whole(body: &str, last_modified: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/plain")
        .insert_header("last-modified", last_modified)
}

#[tokio::test]
async fn test_incremental_growth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .and(header("range", "bytes=10-"))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_string("\ndelta<>2\n")
                .insert_header("content-type", "text/plain")
                .insert_header("content-range", "bytes 10-19/20")
                .insert_header("last-modified", SECOND_MODIFIED),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(whole("OK<>1<>dat\n", FIRST_MODIFIED))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let mut events = h.etch.subscribe();
    let url = dat_url(&server);

    let first = h.client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers().get("X-Cache-Status").unwrap(), "MISS");
    assert_eq!(first.text().await.unwrap(), "OK<>1<>dat\n");

    let second = h.client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers().get("X-Cache-Status").unwrap(), "APPEND");
    assert!(second.headers().get("content-range").is_none());
    assert_eq!(second.text().await.unwrap(), "OK<>1<>dat\ndelta<>2\n");

    let id = dat_id(&server);
    assert_eq!(
        cached(&h.etch, &id).await.unwrap().as_ref(),
        b"OK<>1<>dat\ndelta<>2\n"
    );
    assert_eq!(events.try_recv(), Some(CacheEvent::update(id.clone(), 0)));
    assert_eq!(events.try_recv(), Some(CacheEvent::update(id, 1)));
}

#[tokio::test]
async fn test_concurrent_requests_hit_upstream_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(whole("OK<>1<>dat\n", FIRST_MODIFIED).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let url = dat_url(&server);

    let responses = join_all((0..8).map(|_| h.client.get(&url).send())).await;

    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "OK<>1<>dat\n");
    }
}

#[tokio::test]
async fn test_shrunk_upstream_is_refetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .and(header_exists("range"))
        .respond_with(ResponseTemplate::new(416))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(whole("OK<>1<>dat\n", SECOND_MODIFIED))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let id = dat_id(&server);
    seed(&h.etch, &id, "OK<>1<>dat\nold<>2\n").await;

    let response = h.client.get(dat_url(&server)).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("X-Cache-Status").unwrap(), "REFETCH");
    assert_eq!(response.text().await.unwrap(), "OK<>1<>dat\n");
    assert_eq!(cached(&h.etch, &id).await.unwrap().as_ref(), b"OK<>1<>dat\n");
}

#[tokio::test]
async fn test_diverged_cache_is_dropped_and_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .and(header_exists("range"))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_string("Xdelta<>2\n")
                .insert_header("content-type", "text/plain")
                .insert_header("content-range", "bytes 10-19/20"),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(whole("NEW<>1<>dat\n", SECOND_MODIFIED))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let id = dat_id(&server);
    seed(&h.etch, &id, "OK<>1<>dat\n").await;
    let mut events = h.etch.subscribe();

    let response = h.client.get(dat_url(&server)).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "NEW<>1<>dat\n");
    assert_eq!(cached(&h.etch, &id).await.unwrap().as_ref(), b"NEW<>1<>dat\n");
    assert_eq!(events.try_recv(), Some(CacheEvent::delete(id.clone())));
    assert_eq!(events.try_recv(), Some(CacheEvent::update(id, 0)));
}

#[tokio::test]
async fn test_not_modified_serves_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .and(header("if-modified-since", FIRST_MODIFIED))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let id = dat_id(&server);
    seed(&h.etch, &id, "OK<>1<>dat\n").await;

    let response = h.client.get(dat_url(&server)).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("X-Cache-Status").unwrap(), "HIT");
    assert_eq!(response.text().await.unwrap(), "OK<>1<>dat\n");
}

#[tokio::test]
async fn test_retired_status_is_remapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(ResponseTemplate::new(203).set_body_string("gone"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let response = h.client.get(dat_url(&server)).send().await.unwrap();

    assert_eq!(response.status(), 402);
    assert_eq!(
        response.headers().get("X-Original-Status-Code").unwrap(),
        "203"
    );
    assert!(cached(&h.etch, &dat_id(&server)).await.is_none());
}

#[tokio::test]
async fn test_client_range_is_not_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(whole("OK<>1<>dat\n", FIRST_MODIFIED))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let response = h
        .client
        .get(dat_url(&server))
        .header("range", "bytes=0-3")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "OK<>1<>dat\n");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("range").is_none());
}

#[tokio::test]
async fn test_non_get_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("posted"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let response = h
        .client
        .post(dat_url(&server))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert!(response.headers().get("X-Cache-Status").is_none());
    assert_eq!(response.text().await.unwrap(), "posted");
    assert!(cached(&h.etch, &dat_id(&server)).await.is_none());
}

#[tokio::test]
async fn test_transport_failure_is_returned() {
    let h = harness();

    let result = h
        .client
        .get("http://127.0.0.1:1/book/dat/1.dat")
        .send()
        .await;

    assert!(result.is_err());
    let id = ResourceId::new("127.0.0.1:1", "/book/dat/1.dat");
    assert!(cached(&h.etch, &id).await.is_none());
}

#[tokio::test]
async fn test_request_timeout_applies_to_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAT_PATH))
        .respond_with(whole("OK<>1<>dat\n", FIRST_MODIFIED).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let h = harness();
    let result = h
        .client
        .get(dat_url(&server))
        .timeout(Duration::from_millis(100))
        .send()
        .await;

    assert!(result.is_err());
    assert!(cached(&h.etch, &dat_id(&server)).await.is_none());
}
