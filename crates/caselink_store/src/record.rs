//! Record envelope over JSON documents.
//!
//! Every synchronizable document is a JSON object carrying a small typed
//! envelope under well-known field names:
//!
//! ```text
//! { "id": "...", "updatedAt": "<RFC 3339>", "deleted": bool,
//!   "deletedAt": "<RFC 3339>", "outbreakId": "...", ...payload... }
//! ```
//!
//! [`Record`] keeps the raw document intact and exposes the envelope through
//! typed accessors. An Outbreak document's own `id` serves as its scope key.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical envelope field names.
const FIELD_ID: &str = "id";
const FIELD_UPDATED_AT: &str = "updatedAt";
const FIELD_DELETED: &str = "deleted";
const FIELD_DELETED_AT: &str = "deletedAt";
const FIELD_OUTBREAK_ID: &str = "outbreakId";

/// A document in a named collection.
///
/// The underlying JSON object is preserved verbatim; the accessors parse the
/// envelope fields on demand so foreign documents with unexpected shapes are
/// carried through without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    doc: Map<String, Value>,
}

impl Record {
    /// Creates a record from a JSON object map.
    #[must_use]
    pub fn new(doc: Map<String, Value>) -> Self {
        Self { doc }
    }

    /// Creates a record from any JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDocument`] if the value is not an object.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(doc) => Ok(Self { doc }),
            other => Err(StoreError::InvalidDocument(format!(
                "expected object, got {other}"
            ))),
        }
    }

    /// Consumes the record, returning the raw JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.doc)
    }

    /// Returns the raw document map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.doc
    }

    /// Looks up a possibly-nested field by dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.doc, path)
    }

    /// Sets a top-level field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.doc.insert(field.into(), value);
    }

    /// Returns the record id, if present and a string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.doc.get(FIELD_ID).and_then(Value::as_str)
    }

    /// Sets the record id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.doc.insert(FIELD_ID.into(), Value::String(id.into()));
    }

    /// Removes the record id, if any.
    pub fn clear_id(&mut self) {
        self.doc.remove(FIELD_ID);
    }

    /// Returns the last-modified timestamp, if present and parseable.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.doc.get(FIELD_UPDATED_AT)?)
    }

    /// Sets the last-modified timestamp.
    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.doc
            .insert(FIELD_UPDATED_AT.into(), Value::String(at.to_rfc3339()));
    }

    /// Returns true if the record carries a truthy deleted flag.
    #[must_use]
    pub fn deleted(&self) -> bool {
        match self.doc.get(FIELD_DELETED) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Returns the deletion timestamp, if present and parseable.
    #[must_use]
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.doc.get(FIELD_DELETED_AT)?)
    }

    /// Marks the record deleted at the given time.
    ///
    /// Deletion is a terminal update: the document stays in its collection
    /// with `deleted` set and `deletedAt` recorded.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.doc.insert(FIELD_DELETED.into(), Value::Bool(true));
        self.doc
            .insert(FIELD_DELETED_AT.into(), Value::String(at.to_rfc3339()));
    }

    /// Returns the outbreak scope key, if any.
    ///
    /// Collections without scoping carry no `outbreakId` and are global.
    #[must_use]
    pub fn outbreak_id(&self) -> Option<&str> {
        self.doc.get(FIELD_OUTBREAK_ID).and_then(Value::as_str)
    }

    /// Sets the outbreak scope key.
    pub fn set_outbreak_id(&mut self, outbreak_id: impl Into<String>) {
        self.doc
            .insert(FIELD_OUTBREAK_ID.into(), Value::String(outbreak_id.into()));
    }
}

/// Parses an envelope timestamp value.
///
/// Accepts RFC 3339 strings and integer epoch milliseconds.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Looks up a dotted path (`address.location.id`) inside a JSON object.
#[must_use]
pub fn lookup_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
