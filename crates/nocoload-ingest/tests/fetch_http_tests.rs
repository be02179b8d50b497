//! HTTP pagination tests against a mock records endpoint
//!
//! Covers:
//! - Offset/limit/fields query parameters and the xc-token header
//! - Exhaustive pagination across multiple pages
//! - Backoff on 429 and partial results when retries run out
//! - Partial results on non-retryable errors

use async_trait::async_trait;
use nocoload_ingest::fetcher::{
    Completion, FetchRequest, HttpPageSource, PagedFetcher, RetryPolicy, Sleeper,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TABLE_PATH: &str = "/api/v2/tables/tbl_posts/records";

#[derive(Default, Clone)]
struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

/// Helper to build a records page body
fn page_body(start: u64, count: u64, is_last_page: bool) -> Value {
    let list: Vec<Value> = (start..start + count)
        .map(|i| json!({ "Id": i + 1, "Title": format!("Post {}", i + 1) }))
        .collect();
    json!({
        "list": list,
        "pageInfo": {
            "totalRows": 250,
            "page": start / 100 + 1,
            "pageSize": 100,
            "isFirstPage": start == 0,
            "isLastPage": is_last_page
        }
    })
}

fn request(server: &MockServer, max_retries: u32) -> FetchRequest {
    FetchRequest::for_table(&server.uri(), "tbl_posts", "secret-token")
        .unwrap()
        .with_retry(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(250),
            max_delay: None,
        })
}

fn fetcher() -> (PagedFetcher<HttpPageSource, RecordingSleeper>, RecordingSleeper) {
    let sleeper = RecordingSleeper::default();
    let source = HttpPageSource::new(Duration::from_secs(5)).unwrap();
    (PagedFetcher::new(source, sleeper.clone()), sleeper)
}

async fn mount_page(server: &MockServer, offset: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn requested_offsets(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|req| {
            req.url
                .query_pairs()
                .find(|(k, _)| k == "offset")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        })
        .collect()
}

#[tokio::test]
async fn test_fetches_all_pages_in_order() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page_body(0, 100, false)).await;
    mount_page(&server, 100, page_body(100, 100, false)).await;
    mount_page(&server, 200, page_body(200, 50, true)).await;

    let (fetcher, sleeper) = fetcher();
    let outcome = fetcher.fetch_all(&request(&server, 3)).await;

    assert_eq!(outcome.completion, Completion::Complete);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.records.len(), 250);
    assert_eq!(outcome.records[0]["Id"], json!(1));
    assert_eq!(outcome.records[249]["Id"], json!(250));
    assert_eq!(requested_offsets(&server).await, vec!["0", "100", "200"]);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_sends_token_limit_and_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(header("xc-token", "secret-token"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "25"))
        .and(query_param("fields", "Id,Title"))
        .and(query_param("where", "(Status,eq,Published)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 3, true)))
        .expect(1)
        .mount(&server)
        .await;

    let mut query = BTreeMap::new();
    query.insert("limit".to_string(), json!(25));
    query.insert("where".to_string(), json!("(Status,eq,Published)"));

    let request = request(&server, 0)
        .with_query(query)
        .with_fields(vec!["Id".to_string(), "Title".to_string()]);

    let (fetcher, _) = fetcher();
    let outcome = fetcher.fetch_all(&request).await;

    assert_eq!(outcome.completion, Completion::Complete);
    assert_eq!(outcome.records.len(), 3);
}

#[tokio::test]
async fn test_empty_table_is_not_an_error() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!({ "list": [], "pageInfo": { "isLastPage": true } })).await;

    let (fetcher, _) = fetcher();
    let outcome = fetcher.fetch_all(&request(&server, 1)).await;

    assert_eq!(outcome.completion, Completion::Complete);
    assert!(outcome.records.is_empty());
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;

    // First two calls are rate limited, the third succeeds
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_page(&server, 0, page_body(0, 10, true)).await;

    let (fetcher, sleeper) = fetcher();
    let outcome = fetcher.fetch_all(&request(&server, 3)).await;

    assert_eq!(outcome.completion, Completion::Complete);
    assert_eq!(outcome.records.len(), 10);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(250), Duration::from_millis(500)]
    );
    assert_eq!(requested_offsets(&server).await, vec!["0", "0", "0"]);
}

#[tokio::test]
async fn test_exhausted_retries_return_earlier_pages() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page_body(0, 100, false)).await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher();
    let outcome = fetcher.fetch_all(&request(&server, 2)).await;

    assert_eq!(outcome.completion, Completion::RetriesExhausted { offset: 100 });
    assert_eq!(outcome.records.len(), 100);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(250), Duration::from_millis(500)]
    );
    // One successful page, then the initial attempt plus two retries
    assert_eq!(requested_offsets(&server).await, vec!["0", "100", "100", "100"]);
}

#[tokio::test]
async fn test_server_error_stops_without_retry() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page_body(0, 100, false)).await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher();
    let outcome = fetcher.fetch_all(&request(&server, 5)).await;

    assert!(matches!(outcome.completion, Completion::Failed { offset: 100, .. }));
    assert_eq!(outcome.records.len(), 100);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_malformed_body_keeps_collected_records() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page_body(0, 100, false)).await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher();
    let outcome = fetcher.fetch_all(&request(&server, 1)).await;

    assert!(matches!(outcome.completion, Completion::Failed { .. }));
    assert_eq!(outcome.records.len(), 100);
}

#[tokio::test]
async fn test_unreachable_source_returns_nothing() {
    // Reserve a port, then release it so nothing is listening there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let request =
        FetchRequest::for_table(&format!("http://127.0.0.1:{}", port), "tbl_posts", "secret-token")
            .unwrap();
    let (fetcher, sleeper) = fetcher();
    let outcome = fetcher.fetch_all(&request).await;

    assert!(matches!(outcome.completion, Completion::Failed { offset: 0, .. }));
    assert!(outcome.records.is_empty());
    assert!(sleeper.delays().is_empty());
}
