//! Paginated record fetching
//!
//! Walks a NocoDB-style records endpoint page by page:
//!
//! ```text
//! GET {base}/api/v2/tables/{table}/records?offset=N&limit=M&fields=a,b
//! xc-token: <api key>
//! ```
//!
//! Rate-limited pages (HTTP 429) are retried with exponential backoff. The retry
//! budget is per page and is restored after every successful page. Any other
//! failure ends pagination; records collected up to that point are always
//! returned rather than discarded.

use async_trait::async_trait;
use nocoload_common::types::RawRecord;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

// ============================================================================
// Fetcher Constants
// ============================================================================

/// Page size used when the table query does not specify `limit`.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Rate-limit retries allowed per page.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// First backoff delay after a 429; doubles on each further 429 for the same page.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Header carrying the API token.
pub const AUTH_HEADER: &str = "xc-token";

/// Errors from fetching a single page
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP 429 from the source, whether seen as a status or as a client error
    #[error("Rate limited by source (HTTP 429)")]
    RateLimited,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid page payload: {0}")]
    Decode(String),

    #[error("Invalid records endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl FetchError {
    /// Classify a client error, lifting 429 responses into [`FetchError::RateLimited`]
    pub fn from_client(err: reqwest::Error) -> Self {
        if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            FetchError::RateLimited
        } else {
            FetchError::Transport(err)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

/// Backoff settings for rate-limited pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed for one page before the fetch gives up
    pub max_retries: u32,

    pub base_delay: Duration,

    /// Optional ceiling on the doubled delay; `None` doubles without bound
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }

    /// Delay before the first retry of a page
    pub fn initial_delay(&self) -> Duration {
        self.cap(self.base_delay)
    }

    /// Delay after `current`, doubled and capped
    pub fn next_delay(&self, current: Duration) -> Duration {
        self.cap(current.saturating_mul(2))
    }
}

/// Everything needed to fetch all records of one table.
///
/// The offset is not part of the request; [`PagedFetcher::fetch_all`] owns the cursor.
#[derive(Clone)]
pub struct FetchRequest {
    pub endpoint: Url,
    pub token: String,

    /// Extra query parameters (`where`, `sort`, `viewId`, `limit`, ...)
    pub query: BTreeMap<String, Value>,

    /// Columns to select; empty selects all
    pub fields: Vec<String>,

    pub retry: RetryPolicy,
}

impl std::fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &"<redacted>")
            .field("query", &self.query)
            .field("fields", &self.fields)
            .field("retry", &self.retry)
            .finish()
    }
}

impl FetchRequest {
    /// Build a request for `{base_url}/api/v2/tables/{table_id}/records`
    pub fn for_table(
        base_url: &str,
        table_id: &str,
        token: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let mut endpoint = Url::parse(base_url)?;
        endpoint
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["api", "v2", "tables", table_id, "records"]);

        Ok(Self {
            endpoint,
            token: token.into(),
            query: BTreeMap::new(),
            fields: Vec::new(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_query(mut self, query: BTreeMap<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Page size: the query's positive `limit`, or [`DEFAULT_PAGE_LIMIT`]
    pub fn limit(&self) -> u64 {
        let requested = match self.query.get("limit") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        requested.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    /// Query string pairs for the page starting at `offset`
    pub fn query_pairs(&self, offset: u64) -> Vec<(String, String)> {
        let select_fields = !self.fields.is_empty();

        let mut pairs: Vec<(String, String)> = self
            .query
            .iter()
            .filter(|(key, _)| key.as_str() != "offset" && key.as_str() != "limit")
            .filter(|(key, _)| !(select_fields && key.as_str() == "fields"))
            .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v)))
            .collect();

        pairs.push(("offset".to_string(), offset.to_string()));
        pairs.push(("limit".to_string(), self.limit().to_string()));
        if select_fields {
            pairs.push(("fields".to_string(), self.fields.join(",")));
        }

        pairs
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// One page of records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub is_last_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    #[serde(default)]
    list: Option<Vec<RawRecord>>,

    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    is_last_page: Option<bool>,
}

impl PageResponse {
    fn into_page(self) -> Page {
        Page {
            records: self.list.unwrap_or_default(),
            // Without pagination info there is no way to ask for more.
            is_last_page: self.page_info.and_then(|p| p.is_last_page).unwrap_or(true),
        }
    }
}

/// Decode a records response body into a [`Page`]
pub fn parse_page(body: &[u8]) -> Result<Page, FetchError> {
    serde_json::from_slice::<PageResponse>(body)
        .map(PageResponse::into_page)
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// Something that can return the page of records at a given offset
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &FetchRequest, offset: u64) -> Result<Page, FetchError>;
}

/// Waits between rate-limited attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// [`PageSource`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nocoload/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, request: &FetchRequest, offset: u64) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(request.endpoint.clone())
            .header(AUTH_HEADER, &request.token)
            .query(&request.query_pairs(offset))
            .send()
            .await
            .map_err(FetchError::from_client)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }

        let response = response.error_for_status().map_err(FetchError::from_client)?;
        let body = response.bytes().await.map_err(FetchError::from_client)?;

        parse_page(&body)
    }
}

/// How a fetch-all call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The source reported the last page
    Complete,

    /// A page stayed rate limited after its whole retry budget
    RetriesExhausted { offset: u64 },

    /// A non-retryable error ended pagination
    Failed { offset: u64, error: String },
}

/// Records gathered by [`PagedFetcher::fetch_all`], complete or not
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub pages: usize,
    pub completion: Completion,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }
}

/// Sequential, offset-driven pagination with per-page rate-limit retries
pub struct PagedFetcher<S = HttpPageSource, W = TokioSleeper> {
    source: S,
    sleeper: W,
}

impl PagedFetcher {
    /// HTTP fetcher with real sleeps
    pub fn http(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::new(HttpPageSource::new(timeout)?, TokioSleeper))
    }
}

impl<S: PageSource, W: Sleeper> PagedFetcher<S, W> {
    pub fn new(source: S, sleeper: W) -> Self {
        Self { source, sleeper }
    }

    /// Fetch every page of `request`.
    ///
    /// Never fails: rate-limit exhaustion and transport errors end pagination and
    /// are reported through [`FetchOutcome::completion`] alongside the records
    /// already collected.
    #[instrument(skip(self, request), fields(endpoint = %request.endpoint))]
    pub async fn fetch_all(&self, request: &FetchRequest) -> FetchOutcome {
        let policy = request.retry;
        let mut records: Vec<RawRecord> = Vec::new();
        let mut pages = 0usize;
        let mut offset = 0u64;
        let mut retries_left = policy.max_retries;
        let mut delay = policy.initial_delay();

        let completion = loop {
            match self.source.fetch_page(request, offset).await {
                Ok(page) => {
                    pages += 1;
                    let received = page.records.len() as u64;
                    records.extend(page.records);
                    debug!(offset, received, last = page.is_last_page, "Fetched page");

                    if page.is_last_page || received == 0 {
                        break Completion::Complete;
                    }

                    offset += received;
                    retries_left = policy.max_retries;
                    delay = policy.initial_delay();
                },
                Err(FetchError::RateLimited) if retries_left > 0 => {
                    warn!(
                        offset,
                        retries_left,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited by source, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    retries_left -= 1;
                    delay = policy.next_delay(delay);
                },
                Err(FetchError::RateLimited) => {
                    error!(
                        offset,
                        max_retries = policy.max_retries,
                        collected = records.len(),
                        "Retry limit reached while rate limited, returning partial results"
                    );
                    break Completion::RetriesExhausted { offset };
                },
                Err(err) => {
                    error!(
                        offset,
                        error = %err,
                        collected = records.len(),
                        "Fetch failed, returning partial results"
                    );
                    break Completion::Failed {
                        offset,
                        error: err.to_string(),
                    };
                },
            }
        };

        info!(records = records.len(), pages, complete = completion == Completion::Complete, "Fetch finished");

        FetchOutcome {
            records,
            pages,
            completion,
        }
    }
}
