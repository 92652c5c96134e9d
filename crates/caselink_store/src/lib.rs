//! # Caselink Store
//!
//! Data model and document-store access layer for the Caselink sync engine.
//!
//! This crate provides:
//! - The [`Record`] envelope over JSON case-management documents
//! - The static [`catalog`] of synchronizable collections
//! - A typed [`Filter`] expression tree and its [`translate`] function,
//!   producing native [`Predicate`]s
//! - The [`DocumentStore`] trait the engine issues predicates to, with an
//!   in-memory implementation for tests and embedded use
//!
//! ## Key Invariants
//!
//! - Deletion is always a terminal update (`deleted` + `deletedAt`), never
//!   removal of the document
//! - `find` results are ordered by record id, so repeated paged reads form
//!   a stable forward-only cursor
//! - Outbreak-scoped collections are declared in the catalog, not guessed
//!   from document shape

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod error;
mod filter;
mod record;
mod store;

pub use catalog::{catalog, collections_for, spec_for, CollectionSpec, ExportType};
pub use error::{StoreError, StoreResult};
pub use filter::{translate, Filter, Predicate};
pub use record::{lookup_path, Record};
pub use store::{DocumentStore, FindOptions, MemoryStore};
