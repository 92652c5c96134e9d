//! # Caselink Engine
//!
//! The synchronization core: merging independently-mutated replicas using
//! only per-record last-modified timestamps.
//!
//! This crate provides:
//! - The [`merge`] resolver deciding create/update/remove/ignore per record
//! - The [`Exporter`] pipeline streaming collections into a snapshot archive
//! - The [`Importer`] pipeline unpacking, decrypting, and applying snapshots
//! - The [`AccessScope`] input contract describing what a caller may touch
//!
//! ## Key Invariants
//!
//! - Last-writer-wins per record; ties favor the local replica
//! - Deletion is a terminal update, never implicit
//! - Outbreak-scoped records only cross the boundary for authorized
//!   outbreak ids
//! - Working directories are removed on every exit path

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod export;
mod import;
mod merge;
mod scope;

pub use error::{EngineError, EngineResult};
pub use export::{ExportOptions, ExportOutput, Exporter, DEFAULT_CHUNK_SIZE};
pub use import::{
    ImportOptions, ImportOutput, ImportStage, ImportStats, Importer, ProgressSnapshot,
    UnpackedSnapshot, DEFAULT_DECRYPT_PARALLELISM,
};
pub use merge::{merge, MergeAction, MergeOutcome};
pub use scope::{AccessScope, CollectionSelection, OutbreakScope};
