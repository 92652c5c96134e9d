//! Error types for the sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the merge, export, and import pipelines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Document-store error.
    #[error("store error: {0}")]
    Store(#[from] caselink_store::StoreError),

    /// Archive or encryption error.
    #[error("archive error: {0}")]
    Archive(#[from] caselink_archive::ArchiveError),

    /// File system error in a pipeline stage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch artifact held malformed JSON.
    #[error("malformed batch artifact: {0}")]
    MalformedBatch(#[from] serde_json::Error),

    /// Nothing matched the export selection.
    ///
    /// A distinguished outcome, not a generic failure: callers surface it
    /// as "no data to export" rather than an error report.
    #[error("no data matched the export selection")]
    NoData,

    /// The request named outbreaks outside the caller's scope.
    #[error("outbreaks not allowed: {0:?}")]
    OutbreaksNotAllowed(Vec<String>),

    /// A snapshot contains encrypted artifacts but no passphrase was given.
    #[error("snapshot is encrypted and no passphrase was provided")]
    PassphraseRequired,

    /// Every artifact in a snapshot failed to decrypt or unpack.
    #[error("no usable data in snapshot; {} artifact(s) failed", failures.len())]
    NothingUsable {
        /// Per-artifact failure descriptions.
        failures: Vec<String>,
    },
}

impl EngineError {
    /// Returns true for the distinguished empty-selection outcome.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, EngineError::NoData)
    }
}
