//! nocoload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the nocoload workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`NocoError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by `LOG_*` environment variables
//! - **Types**: records, entries and attachments exchanged between the fetcher
//!   and the ingest pipeline
//!
//! # Example
//!
//! ```no_run
//! use nocoload_common::types::Entry;
//! use nocoload_common::Result;
//!
//! fn describe(entry: &Entry) -> Result<String> {
//!     Ok(serde_json::to_string(entry)?)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{NocoError, Result};
