//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document was not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A record was inserted or updated without an id.
    #[error("record has no id")]
    MissingId,

    /// An insert collided with an existing record id.
    #[error("duplicate record id {id:?} in collection {collection:?}")]
    DuplicateId {
        /// Collection name.
        collection: String,
        /// Colliding record id.
        id: String,
    },

    /// An update targeted a record that does not exist.
    #[error("record {id:?} not found in collection {collection:?}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Missing record id.
        id: String,
    },

    /// A regex filter failed to compile.
    #[error("invalid regex for field {field:?}: {source}")]
    InvalidRegex {
        /// Field the pattern applied to.
        field: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },
}
