//! Record merge resolution.
//!
//! Two replicas that mutated independently are reconciled one record at a
//! time using only per-record last-modified timestamps: last writer wins,
//! ties favor the local replica, and deletion is applied as a terminal
//! update. The resolver is idempotent, so replaying a snapshot against an
//! already-merged replica is harmless.

use crate::error::EngineResult;
use caselink_store::{DocumentStore, Record};
use chrono::Utc;
use uuid::Uuid;

/// What the resolver did with one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// The record did not exist locally and was inserted.
    Created,
    /// The incoming record was newer and replaced the local one.
    Updated,
    /// The incoming record was newer and carried a deletion.
    Removed,
    /// The local record was newer or equally recent; nothing changed.
    Untouched,
}

/// Result of merging one incoming record.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The record as it now stands in the store (the local record when
    /// the action is [`MergeAction::Untouched`]).
    pub record: Record,
    /// What happened.
    pub action: MergeAction,
}

/// Merges one incoming record into a collection.
///
/// Resolution rules, in order:
/// 1. No id, or no local record under that id even counting soft-deleted
///    ones: insert as a new record.
/// 2. A local record exists but the incoming one has no `updatedAt`: the
///    incoming record is untrusted. Its id is discarded and it is inserted
///    under a fresh id rather than blindly overwriting local state.
/// 3. The incoming `updatedAt` is strictly newer: incoming wins. If it also
///    carries a deletion while the local record is still live, the field
///    changes and the deletion land as one atomic store update.
/// 4. Otherwise the local record stands; ties favor local.
pub fn merge(
    store: &dyn DocumentStore,
    collection: &str,
    mut incoming: Record,
) -> EngineResult<MergeOutcome> {
    let local = match incoming.id() {
        Some(id) => store.get(collection, id, true)?,
        None => None,
    };

    let Some(local) = local else {
        if incoming.id().is_none() {
            incoming.set_id(Uuid::new_v4().to_string());
        }
        store.insert(collection, incoming.clone())?;
        return Ok(MergeOutcome {
            record: incoming,
            action: MergeAction::Created,
        });
    };

    let Some(incoming_at) = incoming.updated_at() else {
        // Foreign record with no provenance: never overwrite, re-identify.
        incoming.set_id(Uuid::new_v4().to_string());
        store.insert(collection, incoming.clone())?;
        return Ok(MergeOutcome {
            record: incoming,
            action: MergeAction::Created,
        });
    };

    // A local record without `updatedAt` loses to any timestamped incoming.
    if local.updated_at() >= Some(incoming_at) {
        return Ok(MergeOutcome {
            record: local,
            action: MergeAction::Untouched,
        });
    }

    if incoming.deleted() && !local.deleted() {
        // Field changes and the deletion commit as a single update; there
        // is no window where the new fields exist without the tombstone.
        if incoming.deleted_at().is_none() {
            incoming.mark_deleted(incoming.updated_at().unwrap_or_else(Utc::now));
        }
        store.update(collection, incoming.clone())?;
        return Ok(MergeOutcome {
            record: incoming,
            action: MergeAction::Removed,
        });
    }

    store.update(collection, incoming.clone())?;
    Ok(MergeOutcome {
        record: incoming,
        action: MergeAction::Updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use caselink_store::MemoryStore;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn seeded(local: serde_json::Value) -> MemoryStore {
        let store = MemoryStore::new();
        store.seed("person", vec![local]).unwrap();
        store
    }

    #[test]
    fn missing_id_creates() {
        let store = MemoryStore::new();
        let outcome = merge(&store, "person", record(json!({"name": "Ada"}))).unwrap();

        assert_eq!(outcome.action, MergeAction::Created);
        // A fresh id was assigned.
        let id = outcome.record.id().unwrap().to_owned();
        assert!(store.get("person", &id, false).unwrap().is_some());
    }

    #[test]
    fn unknown_id_creates() {
        let store = MemoryStore::new();
        let incoming = record(json!({"id": "p-1", "updatedAt": t0().to_rfc3339()}));
        let outcome = merge(&store, "person", incoming).unwrap();

        assert_eq!(outcome.action, MergeAction::Created);
        assert_eq!(outcome.record.id(), Some("p-1"));
    }

    #[test]
    fn untrusted_incoming_never_overwrites() {
        let store = seeded(json!({"id": "p-1", "updatedAt": t0().to_rfc3339(), "v": "local"}));
        // Same id, but no updatedAt: untrusted.
        let incoming = record(json!({"id": "p-1", "v": "foreign"}));
        let outcome = merge(&store, "person", incoming).unwrap();

        assert_eq!(outcome.action, MergeAction::Created);
        let new_id = outcome.record.id().unwrap();
        assert_ne!(new_id, "p-1");

        // Local record unchanged.
        let local = store.get("person", "p-1", false).unwrap().unwrap();
        assert_eq!(local.get("v"), Some(&json!("local")));
    }

    #[test]
    fn newer_incoming_wins() {
        let store = seeded(json!({"id": "p-1", "updatedAt": t0().to_rfc3339(), "v": 1}));
        let newer = (t0() + Duration::seconds(1)).to_rfc3339();
        let outcome = merge(
            &store,
            "person",
            record(json!({"id": "p-1", "updatedAt": newer, "v": 2})),
        )
        .unwrap();

        assert_eq!(outcome.action, MergeAction::Updated);
        let stored = store.get("person", "p-1", false).unwrap().unwrap();
        assert_eq!(stored.get("v"), Some(&json!(2)));
    }

    #[test]
    fn older_incoming_untouched() {
        let store = seeded(json!({"id": "p-1", "updatedAt": t0().to_rfc3339(), "v": 1}));
        let older = (t0() - Duration::seconds(1)).to_rfc3339();
        let outcome = merge(
            &store,
            "person",
            record(json!({"id": "p-1", "updatedAt": older, "v": 0})),
        )
        .unwrap();

        assert_eq!(outcome.action, MergeAction::Untouched);
        let stored = store.get("person", "p-1", false).unwrap().unwrap();
        assert_eq!(stored.get("v"), Some(&json!(1)));
    }

    #[test]
    fn tie_favors_local() {
        let store = seeded(json!({"id": "p-1", "updatedAt": t0().to_rfc3339(), "v": "local"}));
        let outcome = merge(
            &store,
            "person",
            record(json!({"id": "p-1", "updatedAt": t0().to_rfc3339(), "v": "remote"})),
        )
        .unwrap();

        assert_eq!(outcome.action, MergeAction::Untouched);
        assert_eq!(outcome.record.get("v"), Some(&json!("local")));
    }

    #[test]
    fn delete_with_update_is_one_transition() {
        let store = seeded(json!({
            "id": "p-1", "updatedAt": t0().to_rfc3339(),
            "deleted": false, "v": 1,
        }));
        let newer = (t0() + Duration::seconds(1)).to_rfc3339();
        let outcome = merge(
            &store,
            "person",
            record(json!({"id": "p-1", "updatedAt": newer, "deleted": true, "v": 2})),
        )
        .unwrap();

        assert_eq!(outcome.action, MergeAction::Removed);

        // Hidden from normal reads, visible to deleted-inclusive lookups.
        assert!(store.get("person", "p-1", false).unwrap().is_none());
        let stored = store.get("person", "p-1", true).unwrap().unwrap();
        assert!(stored.deleted());
        assert!(stored.deleted_at().is_some());
        // The field update landed with the deletion.
        assert_eq!(stored.get("v"), Some(&json!(2)));
    }

    #[test]
    fn already_deleted_records_update_normally() {
        let store = seeded(json!({
            "id": "p-1", "updatedAt": t0().to_rfc3339(),
            "deleted": true, "deletedAt": t0().to_rfc3339(),
        }));
        let newer = (t0() + Duration::seconds(5)).to_rfc3339();
        let outcome = merge(
            &store,
            "person",
            record(json!({
                "id": "p-1", "updatedAt": newer,
                "deleted": true, "deletedAt": t0().to_rfc3339(), "note": "late edit",
            })),
        )
        .unwrap();

        // Not a fresh deletion; just a newer version of a deleted record.
        assert_eq!(outcome.action, MergeAction::Updated);
    }

    #[test]
    fn merge_is_idempotent() {
        let store = MemoryStore::new();
        let incoming = record(json!({"id": "p-1", "updatedAt": t0().to_rfc3339(), "v": 7}));

        let first = merge(&store, "person", incoming.clone()).unwrap();
        assert_eq!(first.action, MergeAction::Created);

        let second = merge(&store, "person", incoming).unwrap();
        assert_eq!(second.action, MergeAction::Untouched);
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Strictly newer incoming always lands; otherwise local stands.
            #[test]
            fn lww_total(local_offset in -300i64..300, incoming_offset in -300i64..300) {
                let local_at = t0() + Duration::seconds(local_offset);
                let incoming_at = t0() + Duration::seconds(incoming_offset);

                let store = seeded(json!({
                    "id": "p-1", "updatedAt": local_at.to_rfc3339(), "side": "local",
                }));
                let outcome = merge(
                    &store,
                    "person",
                    record(json!({
                        "id": "p-1", "updatedAt": incoming_at.to_rfc3339(), "side": "remote",
                    })),
                ).unwrap();

                if incoming_at > local_at {
                    prop_assert_eq!(outcome.action, MergeAction::Updated);
                } else {
                    prop_assert_eq!(outcome.action, MergeAction::Untouched);
                    let stored = store.get("person", "p-1", true).unwrap().unwrap();
                    prop_assert_eq!(stored.get("side"), Some(&json!("local")));
                }
            }
        }
    }
}
