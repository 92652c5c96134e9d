//! Document-store access.
//!
//! The sync engine talks to the operational database through the
//! [`DocumentStore`] trait, issuing native predicates produced by the filter
//! translator. [`MemoryStore`] is the reference implementation used by tests
//! and embedded deployments.

use crate::error::{StoreError, StoreResult};
use crate::filter::Predicate;
use crate::record::Record;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Options for a `find` call.
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Number of matching records to skip.
    pub skip: usize,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Whether soft-deleted records are visible.
    pub include_deleted: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: None,
            include_deleted: false,
        }
    }
}

impl FindOptions {
    /// Options for one page of a forward-only cursor.
    #[must_use]
    pub fn page(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Makes soft-deleted records visible.
    #[must_use]
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// Access to the node's operational document database.
///
/// Results of `find` are ordered by record id so that repeated paged reads
/// over an unchanged collection behave as a stable forward-only cursor.
pub trait DocumentStore: Send + Sync {
    /// Finds records matching the predicate.
    fn find(
        &self,
        collection: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> StoreResult<Vec<Record>>;

    /// Fetches one record by id.
    ///
    /// With `include_deleted` set, soft-deleted records are returned too;
    /// otherwise they read as absent.
    fn get(&self, collection: &str, id: &str, include_deleted: bool)
        -> StoreResult<Option<Record>>;

    /// Inserts a new record. The record must carry an id.
    fn insert(&self, collection: &str, record: Record) -> StoreResult<()>;

    /// Replaces an existing record by id.
    fn update(&self, collection: &str, record: Record) -> StoreResult<()>;

    /// Counts records matching the predicate.
    fn count(
        &self,
        collection: &str,
        predicate: &Predicate,
        include_deleted: bool,
    ) -> StoreResult<usize>;
}

/// In-memory document store.
///
/// Collections are created lazily on first insert. Records are held in a
/// `BTreeMap` keyed by id, which provides the id ordering `find` promises.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Record>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a collection from JSON values, for tests and CLI fixtures.
    ///
    /// # Errors
    ///
    /// Fails if any value is not an object or lacks an id.
    pub fn seed(&self, collection: &str, values: Vec<serde_json::Value>) -> StoreResult<()> {
        for value in values {
            self.insert(collection, Record::from_value(value)?)?;
        }
        Ok(())
    }

    /// Returns the names of collections holding at least one record.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }
}

impl DocumentStore for MemoryStore {
    fn find(
        &self,
        collection: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> StoreResult<Vec<Record>> {
        let collections = self.collections.read();
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let matching = records
            .values()
            .filter(|r| options.include_deleted || !r.deleted())
            .filter(|r| predicate.matches(r))
            .skip(options.skip);

        Ok(match options.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    fn get(
        &self,
        collection: &str,
        id: &str,
        include_deleted: bool,
    ) -> StoreResult<Option<Record>> {
        let collections = self.collections.read();
        let record = collections
            .get(collection)
            .and_then(|records| records.get(id));

        Ok(record
            .filter(|r| include_deleted || !r.deleted())
            .cloned())
    }

    fn insert(&self, collection: &str, record: Record) -> StoreResult<()> {
        let id = record.id().ok_or(StoreError::MissingId)?.to_owned();
        let mut collections = self.collections.write();
        let records = collections.entry(collection.to_owned()).or_default();

        if records.contains_key(&id) {
            return Err(StoreError::DuplicateId {
                collection: collection.to_owned(),
                id,
            });
        }
        records.insert(id, record);
        Ok(())
    }

    fn update(&self, collection: &str, record: Record) -> StoreResult<()> {
        let id = record.id().ok_or(StoreError::MissingId)?.to_owned();
        let mut collections = self.collections.write();
        let records = collections
            .entry(collection.to_owned())
            .or_default();

        if !records.contains_key(&id) {
            return Err(StoreError::NotFound {
                collection: collection.to_owned(),
                id,
            });
        }
        records.insert(id, record);
        Ok(())
    }

    fn count(
        &self,
        collection: &str,
        predicate: &Predicate,
        include_deleted: bool,
    ) -> StoreResult<usize> {
        let collections = self.collections.read();
        let Some(records) = collections.get(collection) else {
            return Ok(0);
        };
        Ok(records
            .values()
            .filter(|r| include_deleted || !r.deleted())
            .filter(|r| predicate.matches(r))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{translate, Filter};
    use chrono::Utc;
    use serde_json::json;

    fn store_with_people(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..count {
            store
                .seed("person", vec![json!({"id": format!("p-{i:03}"), "n": i})])
                .unwrap();
        }
        store
    }

    #[test]
    fn insert_requires_id() {
        let store = MemoryStore::new();
        let record = Record::from_value(json!({"name": "anon"})).unwrap();
        assert!(matches!(
            store.insert("person", record),
            Err(StoreError::MissingId)
        ));
    }

    #[test]
    fn insert_rejects_duplicates() {
        let store = store_with_people(1);
        let dup = Record::from_value(json!({"id": "p-000"})).unwrap();
        assert!(matches!(
            store.insert("person", dup),
            Err(StoreError::DuplicateId { .. })
        ));
    }

    #[test]
    fn update_requires_existing() {
        let store = MemoryStore::new();
        let record = Record::from_value(json!({"id": "ghost"})).unwrap();
        assert!(matches!(
            store.update("person", record),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn find_is_id_ordered_and_pageable() {
        let store = store_with_people(5);
        let all = translate(&Filter::And(vec![])).unwrap();

        let page1 = store
            .find("person", &all, &FindOptions::page(0, 2))
            .unwrap();
        let page2 = store
            .find("person", &all, &FindOptions::page(2, 2))
            .unwrap();
        let page3 = store
            .find("person", &all, &FindOptions::page(4, 2))
            .unwrap();

        let ids: Vec<_> = page1
            .iter()
            .chain(&page2)
            .chain(&page3)
            .map(|r| r.id().unwrap().to_owned())
            .collect();
        assert_eq!(ids, vec!["p-000", "p-001", "p-002", "p-003", "p-004"]);
        assert_eq!(page3.len(), 1);
    }

    #[test]
    fn soft_deleted_hidden_by_default() {
        let store = store_with_people(2);
        let mut victim = store.get("person", "p-000", false).unwrap().unwrap();
        victim.mark_deleted(Utc::now());
        store.update("person", victim).unwrap();

        assert!(store.get("person", "p-000", false).unwrap().is_none());
        let found = store.get("person", "p-000", true).unwrap().unwrap();
        assert!(found.deleted_at().is_some());

        let all = translate(&Filter::And(vec![])).unwrap();
        assert_eq!(store.count("person", &all, false).unwrap(), 1);
        assert_eq!(store.count("person", &all, true).unwrap(), 2);
    }

    #[test]
    fn predicate_pushdown() {
        let store = MemoryStore::new();
        store
            .seed(
                "person",
                vec![
                    json!({"id": "a", "outbreakId": "ob-1"}),
                    json!({"id": "b", "outbreakId": "ob-2"}),
                    json!({"id": "c", "outbreakId": "ob-1"}),
                ],
            )
            .unwrap();

        let scoped = translate(&Filter::in_strings("outbreakId", vec!["ob-1"])).unwrap();
        let found = store
            .find("person", &scoped, &FindOptions::default())
            .unwrap();
        assert_eq!(found.len(), 2);

        let missing = store
            .find("nothing_here", &scoped, &FindOptions::default())
            .unwrap();
        assert!(missing.is_empty());
    }
}
