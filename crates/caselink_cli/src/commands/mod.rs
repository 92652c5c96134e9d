//! CLI command implementations.

pub mod export;
pub mod import;
pub mod peers;

use caselink_store::{FindOptions, MemoryStore, Predicate};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Loads a data file (JSON object mapping collection names to record
/// arrays) into a fresh in-memory store.
pub fn load_store(path: &Path) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    let data: BTreeMap<String, Vec<serde_json::Value>> = serde_json::from_str(&raw)?;

    let store = MemoryStore::new();
    for (collection, records) in data {
        store.seed(&collection, records)?;
    }
    Ok(store)
}

/// Writes a store back out in the data-file format, deleted records
/// included.
pub fn save_store(store: &MemoryStore, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut data: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for collection in store.collection_names() {
        let records = caselink_store::DocumentStore::find(
            store,
            &collection,
            &Predicate::all(),
            &FindOptions::default().with_deleted(),
        )?;
        data.insert(
            collection,
            records.into_iter().map(|r| r.into_value()).collect(),
        );
    }
    fs::write(path, serde_json::to_string_pretty(&data)?)?;
    Ok(())
}
