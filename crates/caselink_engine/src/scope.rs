//! Access-scope input contract.
//!
//! The request/authorization layer resolves what an authenticated principal
//! may touch and hands the result in as data. The engine never re-derives
//! permissions; it only enforces the scope it was given.

use crate::error::{EngineError, EngineResult};
use caselink_store::{catalog, collections_for, CollectionSpec, ExportType};
use std::collections::BTreeSet;

/// The set of outbreak ids a caller may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutbreakScope {
    /// No restriction; every outbreak is in scope.
    Unrestricted,
    /// Only the listed outbreak ids are in scope.
    Allowed(BTreeSet<String>),
}

impl OutbreakScope {
    /// Builds a restricted scope from outbreak ids.
    ///
    /// An empty list means unrestricted, matching the peer protocol where
    /// an empty allow-list signals "everything".
    pub fn from_ids<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        let set: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if set.is_empty() {
            OutbreakScope::Unrestricted
        } else {
            OutbreakScope::Allowed(set)
        }
    }

    /// Returns true if the scope permits a record with the given scope key.
    ///
    /// Records without a scope key belong to global collections and are
    /// always permitted.
    #[must_use]
    pub fn permits(&self, outbreak_id: Option<&str>) -> bool {
        match (self, outbreak_id) {
            (OutbreakScope::Unrestricted, _) | (_, None) => true,
            (OutbreakScope::Allowed(ids), Some(id)) => ids.contains(id),
        }
    }

    /// Returns the allowed ids, or `None` when unrestricted.
    #[must_use]
    pub fn ids(&self) -> Option<&BTreeSet<String>> {
        match self {
            OutbreakScope::Unrestricted => None,
            OutbreakScope::Allowed(ids) => Some(ids),
        }
    }

    /// Validates explicitly requested outbreak ids against this scope.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutbreaksNotAllowed`] enumerating every
    /// disallowed id, so the caller sees the whole problem at once.
    pub fn validate_requested(&self, requested: &[String]) -> EngineResult<Vec<String>> {
        match self {
            OutbreakScope::Unrestricted => Ok(requested.to_vec()),
            OutbreakScope::Allowed(ids) => {
                let disallowed: Vec<String> = requested
                    .iter()
                    .filter(|id| !ids.contains(*id))
                    .cloned()
                    .collect();
                if disallowed.is_empty() {
                    Ok(requested.to_vec())
                } else {
                    Err(EngineError::OutbreaksNotAllowed(disallowed))
                }
            }
        }
    }
}

/// Which collections a request targets.
#[derive(Debug, Clone)]
pub enum CollectionSelection {
    /// A named export type with its fixed collection set.
    ExportType(ExportType),
    /// An explicit list of collection names.
    Explicit(Vec<String>),
}

impl CollectionSelection {
    /// Resolves the selection to catalog entries, in catalog order.
    #[must_use]
    pub fn resolve(&self) -> Vec<&'static CollectionSpec> {
        match self {
            CollectionSelection::ExportType(export_type) => catalog()
                .iter()
                .filter(|spec| spec.export_types.contains(export_type))
                .collect(),
            CollectionSelection::Explicit(names) => {
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                collections_for(&refs)
            }
        }
    }
}

/// Effective scope for one export or sync request.
#[derive(Debug, Clone)]
pub struct AccessScope {
    /// Outbreaks the caller may touch.
    pub outbreaks: OutbreakScope,
    /// Resolved location closure for geographically restricted callers.
    pub locations: BTreeSet<String>,
    /// Collections the request targets.
    pub selection: CollectionSelection,
}

impl AccessScope {
    /// Unrestricted scope over an export type.
    #[must_use]
    pub fn full(export_type: ExportType) -> Self {
        Self {
            outbreaks: OutbreakScope::Unrestricted,
            locations: BTreeSet::new(),
            selection: CollectionSelection::ExportType(export_type),
        }
    }

    /// Scope restricted to the given outbreaks.
    pub fn for_outbreaks<S: Into<String>>(
        export_type: ExportType,
        outbreak_ids: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            outbreaks: OutbreakScope::from_ids(outbreak_ids),
            locations: BTreeSet::new(),
            selection: CollectionSelection::ExportType(export_type),
        }
    }
}
