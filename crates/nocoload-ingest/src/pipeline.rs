//! Record ingestion
//!
//! Turns raw records into [`Entry`] values and upserts them into a store. Each
//! record is handled on its own: a record that fails validation is reported and
//! skipped, and the rest of the batch continues.

use crate::schema::ValidationError;
use crate::store::ContentStore;
use crate::table::TableSpec;
use nocoload_common::types::{is_truthy, record_id, Entry, RawRecord, UNKNOWN_ID};
use nocoload_common::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// A record the schema rejected
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRecord {
    pub id: String,
    pub error: ValidationError,
}

/// Outcome of one [`ingest`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Upserts performed, including ones that replaced an existing entry
    pub stored: usize,

    /// Records stored under the fallback id
    pub unknown_ids: usize,

    pub invalid: Vec<InvalidRecord>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Map, identify, validate and shape one record
pub fn build_entry(table: &TableSpec, raw: RawRecord) -> std::result::Result<Entry, InvalidRecord> {
    let mapped = match &table.mapper {
        Some(mapper) => mapper(raw),
        None => raw,
    };

    let id = record_id(&mapped);

    let mut data = table
        .schema
        .validate(&mapped)
        .map_err(|error| InvalidRecord {
            id: id.clone(),
            error,
        })?;

    let body = match &table.body_field {
        Some(field) if data.get(field).is_some_and(is_truthy) => {
            data.shift_remove(field).map(body_text)
        },
        _ => None,
    };

    Ok(Entry { id, data, body })
}

fn body_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Ingest `records` into `store`, one upsert per valid record.
///
/// Validation failures are collected in the report rather than returned as an
/// error; the caller decides whether they fail the collection. Only store
/// failures abort the batch.
#[instrument(skip_all, fields(collection = %table.name, records = records.len()))]
pub fn ingest<S>(table: &TableSpec, records: Vec<RawRecord>, store: &mut S) -> Result<IngestReport>
where
    S: ContentStore + ?Sized,
{
    let mut report = IngestReport::default();

    for raw in records {
        match build_entry(table, raw) {
            Ok(entry) => {
                if entry.id == UNKNOWN_ID {
                    warn!(
                        collection = %table.name,
                        "Record has no Id or id field, storing under fallback id"
                    );
                    report.unknown_ids += 1;
                }
                debug!(id = %entry.id, has_body = entry.body.is_some(), "Storing entry");
                store.upsert(entry)?;
                report.stored += 1;
            },
            Err(invalid) => {
                warn!(id = %invalid.id, error = %invalid.error, "Record failed validation");
                report.invalid.push(invalid);
            },
        }
    }

    info!(
        stored = report.stored,
        invalid = report.invalid.len(),
        unknown_ids = report.unknown_ids,
        "Ingest finished"
    );

    Ok(report)
}
