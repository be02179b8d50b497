//! nocoload Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls every record of a NocoDB-style table, validates and shapes each record,
//! and publishes the result as an id-keyed content collection.
//!
//! # Components
//!
//! - **fetcher**: offset pagination with per-page exponential backoff on HTTP 429
//! - **pipeline**: mapper, identity, schema validation and body promotion
//! - **store**: insertion-ordered content stores and JSON collection snapshots
//! - **sync**: runs the above for every configured collection
//!
//! # Example
//!
//! ```no_run
//! use nocoload_ingest::fetcher::PagedFetcher;
//! use nocoload_ingest::pipeline::ingest;
//! use nocoload_ingest::store::MemoryStore;
//! use nocoload_ingest::table::TableSpec;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let table = TableSpec::new("posts", "m4q1x8cz2b1yq7a").with_body_field("Body");
//!     let request = table.fetch_request("https://noco.example.com", "api-token")?;
//!
//!     let fetcher = PagedFetcher::http(Duration::from_secs(30))?;
//!     let outcome = fetcher.fetch_all(&request).await;
//!
//!     let mut store = MemoryStore::new();
//!     let report = ingest(&table, outcome.records, &mut store)?;
//!     println!("stored {} entries", report.stored);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod fetcher;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod sync;
pub mod table;
