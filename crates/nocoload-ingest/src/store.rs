//! Content stores
//!
//! A store holds the entries of one collection, keyed by entry id. Upserts
//! replace an existing entry in place, so iteration follows first-insertion
//! order no matter how many times an id is rewritten.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use nocoload_common::types::Entry;
use nocoload_common::{NocoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for ingested entries
pub trait ContentStore {
    /// Insert `entry`, replacing any entry with the same id
    fn upsert(&mut self, entry: Entry) -> Result<()>;

    fn get(&self, id: &str) -> Option<&Entry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in first-insertion order
    fn entries(&self) -> Box<dyn Iterator<Item = &Entry> + '_>;

    fn clear(&mut self);
}

/// In-memory, insertion-ordered store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    entries: IndexMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryStore {
    fn upsert(&mut self, entry: Entry) -> Result<()> {
        if let Some(previous) = self.entries.insert(entry.id.clone(), entry) {
            debug!(id = %previous.id, "Replaced existing entry");
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &Entry> + '_> {
        Box::new(self.entries.values())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// On-disk snapshot of one collection, as written by [`write_collection`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFile {
    pub collection: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

/// Path of the snapshot for `collection` inside `dir`
pub fn collection_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{}.json", collection))
}

/// Replace `<dir>/<collection>.json` with the store's entries.
///
/// The file is written to a temporary sibling first and renamed over the
/// target, so readers never observe a half-written collection.
pub fn write_collection(dir: &Path, collection: &str, store: &dyn ContentStore) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let snapshot = CollectionFile {
        collection: collection.to_string(),
        generated_at: Utc::now(),
        entries: store.entries().cloned().collect(),
    };

    let target = collection_path(dir, collection);
    let staging = dir.join(format!(".{}.json.tmp", collection));

    let json = serde_json::to_vec_pretty(&snapshot)?;
    std::fs::write(&staging, json)?;
    std::fs::rename(&staging, &target).map_err(|e| {
        NocoError::store(format!("Failed to move snapshot into {}: {}", target.display(), e))
    })?;

    info!(
        collection,
        entries = snapshot.entries.len(),
        path = %target.display(),
        "Wrote collection"
    );

    Ok(target)
}

/// Load a snapshot written by [`write_collection`] back into a store
pub fn read_collection(dir: &Path, collection: &str) -> Result<MemoryStore> {
    let path = collection_path(dir, collection);
    if !path.exists() {
        return Err(NocoError::CollectionNotFound(path.display().to_string()));
    }

    let snapshot: CollectionFile = serde_json::from_slice(&std::fs::read(&path)?)?;
    let mut store = MemoryStore::new();
    for entry in snapshot.entries {
        store.upsert(entry)?;
    }

    Ok(store)
}
