//! Multi-collection sync
//!
//! Runs fetch → ingest → write for each collection in turn. A collection whose
//! fetch ends early still has its partial entries written; the run moves on to
//! the next collection and the summary records what happened.

use crate::config::SourceConfig;
use crate::fetcher::{Completion, HttpPageSource, PageSource, PagedFetcher, Sleeper, TokioSleeper};
use crate::pipeline::{ingest, IngestReport};
use crate::store::{write_collection, ContentStore, MemoryStore};
use crate::table::TableSpec;
use nocoload_common::{NocoError, Result};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// What happened to one collection
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub name: String,
    pub pages: usize,
    pub fetched: usize,
    /// Distinct entries written
    pub entries: usize,
    pub report: IngestReport,
    pub completion: Completion,
    pub output: PathBuf,
}

impl CollectionSummary {
    pub fn is_clean(&self) -> bool {
        self.completion == Completion::Complete && self.report.is_clean()
    }
}

/// Result of a whole sync run
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub collections: Vec<CollectionSummary>,
}

impl SyncSummary {
    /// Every collection fetched completely with no invalid records
    pub fn is_clean(&self) -> bool {
        self.collections.iter().all(CollectionSummary::is_clean)
    }

    pub fn total_entries(&self) -> usize {
        self.collections.iter().map(|c| c.entries).sum()
    }

    /// Collections that were cut short or had invalid records
    pub fn unclean(&self) -> impl Iterator<Item = &CollectionSummary> {
        self.collections.iter().filter(|c| !c.is_clean())
    }
}

/// Syncs collections from one source into an output directory
pub struct Syncer<S = HttpPageSource, W = TokioSleeper> {
    fetcher: PagedFetcher<S, W>,
    source: SourceConfig,
    output_dir: PathBuf,
}

impl Syncer {
    /// HTTP-backed syncer for `source`
    pub fn from_config(source: SourceConfig, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let fetcher = PagedFetcher::http(source.timeout)
            .map_err(|e| NocoError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(fetcher, source, output_dir))
    }
}

impl<S: PageSource, W: Sleeper> Syncer<S, W> {
    pub fn new(fetcher: PagedFetcher<S, W>, source: SourceConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            source,
            output_dir: output_dir.into(),
        }
    }

    /// Fetch, ingest and write one collection
    #[instrument(skip(self, table), fields(collection = %table.name, table_id = %table.table_id))]
    pub async fn sync_collection(&self, table: &TableSpec) -> Result<CollectionSummary> {
        let request = table
            .fetch_request(&self.source.base_url, &self.source.api_key)
            .map_err(|e| NocoError::config(format!("Collection '{}': {}", table.name, e)))?;

        let outcome = self.fetcher.fetch_all(&request).await;
        if !outcome.is_complete() {
            warn!(
                records = outcome.records.len(),
                completion = ?outcome.completion,
                "Collection fetch incomplete, writing partial results"
            );
        }

        let fetched = outcome.records.len();
        let mut store = MemoryStore::new();
        let report = ingest(table, outcome.records, &mut store)?;
        let output = write_collection(&self.output_dir, &table.name, &store)?;

        Ok(CollectionSummary {
            name: table.name.clone(),
            pages: outcome.pages,
            fetched,
            entries: store.len(),
            report,
            completion: outcome.completion,
            output,
        })
    }

    /// Sync every table in order; fetch problems never stop later tables
    pub async fn sync_all(&self, tables: &[TableSpec]) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        for table in tables {
            let collection = self.sync_collection(table).await?;
            info!(
                collection = %collection.name,
                fetched = collection.fetched,
                entries = collection.entries,
                invalid = collection.report.invalid.len(),
                "Collection synced"
            );
            summary.collections.push(collection);
        }

        Ok(summary)
    }
}
