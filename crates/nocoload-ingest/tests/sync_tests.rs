//! End-to-end sync tests: mock source → collection snapshots on disk

use nocoload_ingest::config::{CollectionsFile, SourceConfig};
use nocoload_ingest::fetcher::Completion;
use nocoload_ingest::store::{read_collection, ContentStore};
use nocoload_ingest::sync::Syncer;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> SourceConfig {
    SourceConfig {
        base_url: server.uri(),
        api_key: "token".to_string(),
        timeout: Duration::from_secs(5),
    }
}

const COLLECTIONS: &str = r#"
[collections.posts]
table_id = "tbl_posts"
body_field = "content"
max_retries = 0

[collections.posts.rename]
Body = "content"

[collections.posts.schema.fields]
Id = { type = "integer", required = true }
Title = { type = "string", required = true }

[collections.authors]
table_id = "tbl_authors"
max_retries = 0
"#;

async fn mount_posts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v2/tables/tbl_posts/records"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [
                { "Id": 1, "Title": "Hello", "Body": "# Hello\n\nFirst post." },
                { "Id": 2, "Title": "Draft", "Body": "" },
                { "Id": 3, "Body": "untitled" }
            ],
            "pageInfo": { "isLastPage": false }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tables/tbl_posts/records"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [{ "Id": 4, "Title": "Last", "Body": "bye" }],
            "pageInfo": { "isLastPage": true }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sync_writes_collections_and_tolerates_failing_tables() {
    let server = MockServer::start().await;
    mount_posts(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tables/tbl_authors/records"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let tables = CollectionsFile::parse(COLLECTIONS).unwrap().table_specs(&[]).unwrap();
    let syncer = Syncer::from_config(source(&server), output.path()).unwrap();

    let summary = syncer.sync_all(&tables).await.unwrap();

    assert_eq!(summary.collections.len(), 2);
    assert!(!summary.is_clean());

    let posts = &summary.collections[0];
    assert_eq!(posts.name, "posts");
    assert_eq!(posts.completion, Completion::Complete);
    assert_eq!(posts.pages, 2);
    assert_eq!(posts.fetched, 4);
    assert_eq!(posts.entries, 3);
    assert_eq!(posts.report.invalid.len(), 1);
    assert_eq!(posts.report.invalid[0].id, "3");

    let authors = &summary.collections[1];
    assert_eq!(authors.completion, Completion::RetriesExhausted { offset: 0 });
    assert_eq!(authors.entries, 0);
    assert!(authors.output.exists());

    let store = read_collection(output.path(), "posts").unwrap();
    let ids: Vec<&str> = store.entries().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "4"]);

    let hello = store.get("1").unwrap();
    assert_eq!(hello.body.as_deref(), Some("# Hello\n\nFirst post."));
    assert!(!hello.data.contains_key("content"));
    assert!(!hello.data.contains_key("Body"));

    let draft = store.get("2").unwrap();
    assert_eq!(draft.body, None);
    assert_eq!(draft.data.get("content"), Some(&json!("")));
}

#[tokio::test]
async fn test_resync_replaces_snapshot() {
    let server = MockServer::start().await;
    mount_posts(&server).await;

    let output = TempDir::new().unwrap();
    let tables = CollectionsFile::parse(COLLECTIONS)
        .unwrap()
        .table_specs(&["posts".to_string()])
        .unwrap();
    let syncer = Syncer::from_config(source(&server), output.path()).unwrap();

    let first = syncer.sync_all(&tables).await.unwrap();
    let before = read_collection(output.path(), "posts").unwrap();
    let second = syncer.sync_all(&tables).await.unwrap();
    let after = read_collection(output.path(), "posts").unwrap();

    assert_eq!(first.total_entries(), second.total_entries());
    assert_eq!(before, after);
}
