//! Static catalog of synchronizable collections.
//!
//! The catalog declares, per collection: the storage name, which export
//! types include it, whether its records reference on-disk attachments,
//! whether it is outbreak-scoped, and whether soft-deleted records are
//! excluded from exports by default.

/// Named export-type groupings of collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportType {
    /// Subset needed by mobile data-collection clients.
    Mobile,
    /// System/reference configuration shared across outbreaks.
    System,
    /// Everything belonging to one or more outbreaks.
    Outbreak,
    /// The full replica.
    Full,
}

impl ExportType {
    /// Returns the fixed set of collection names for this export type.
    #[must_use]
    pub fn collections(self) -> Vec<&'static str> {
        catalog()
            .iter()
            .filter(|spec| spec.export_types.contains(&self))
            .map(|spec| spec.name)
            .collect()
    }
}

/// Catalog entry for one collection.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    /// Storage name of the collection.
    pub name: &'static str,
    /// Whether records are partitioned by outbreak.
    ///
    /// The `outbreak` collection itself is scoped by its own record id.
    pub outbreak_scoped: bool,
    /// Whether records reference files that must travel with an export.
    pub has_attachments: bool,
    /// Whether exports drop soft-deleted records unless told otherwise.
    pub exclude_deleted_by_default: bool,
    /// Export types this collection belongs to.
    pub export_types: &'static [ExportType],
}

use ExportType::{Full, Mobile, Outbreak, System};

const CATALOG: &[CollectionSpec] = &[
    CollectionSpec {
        name: "outbreak",
        outbreak_scoped: true,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, Outbreak, Full],
    },
    CollectionSpec {
        name: "person",
        outbreak_scoped: true,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, Outbreak, Full],
    },
    CollectionSpec {
        name: "relationship",
        outbreak_scoped: true,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, Outbreak, Full],
    },
    CollectionSpec {
        name: "follow_up",
        outbreak_scoped: true,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, Outbreak, Full],
    },
    CollectionSpec {
        name: "lab_result",
        outbreak_scoped: true,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Outbreak, Full],
    },
    CollectionSpec {
        name: "cluster",
        outbreak_scoped: true,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Outbreak, Full],
    },
    CollectionSpec {
        name: "attachment",
        outbreak_scoped: true,
        has_attachments: true,
        exclude_deleted_by_default: true,
        export_types: &[Outbreak, Full],
    },
    CollectionSpec {
        name: "reference_data",
        outbreak_scoped: false,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, System, Full],
    },
    CollectionSpec {
        name: "location",
        outbreak_scoped: false,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, System, Full],
    },
    CollectionSpec {
        name: "language_token",
        outbreak_scoped: false,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[Mobile, System, Full],
    },
    CollectionSpec {
        name: "team",
        outbreak_scoped: false,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[System, Full],
    },
    CollectionSpec {
        name: "user",
        outbreak_scoped: false,
        has_attachments: false,
        exclude_deleted_by_default: true,
        export_types: &[System, Full],
    },
    CollectionSpec {
        name: "audit_log",
        outbreak_scoped: false,
        has_attachments: false,
        // Audit entries are append-only; nothing to drop.
        exclude_deleted_by_default: false,
        export_types: &[Full],
    },
];

/// Returns the full collection catalog.
#[must_use]
pub fn catalog() -> &'static [CollectionSpec] {
    CATALOG
}

/// Looks up a collection by storage name.
#[must_use]
pub fn spec_for(name: &str) -> Option<&'static CollectionSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

/// Resolves an explicit collection list to catalog entries, in catalog order.
///
/// Unknown names are ignored; the caller validates the request upstream.
#[must_use]
pub fn collections_for(names: &[&str]) -> Vec<&'static CollectionSpec> {
    CATALOG
        .iter()
        .filter(|spec| names.contains(&spec.name))
        .collect()
}
