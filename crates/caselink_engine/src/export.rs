//! Collection export pipeline.
//!
//! Streams selected collections to disk in bounded batches, each batch one
//! nested artifact named `<collection>.<batch>.json`, optionally encrypted,
//! all folded into a single portable container. Collections are exported
//! independently and sequentially over a forward-only cursor; there is no
//! shared transaction.

use crate::error::{EngineError, EngineResult};
use crate::scope::{AccessScope, OutbreakScope};
use caselink_archive::{artifact_name, pack_dir, pack_file, SnapshotCipher, Workdir};
use caselink_store::{translate, CollectionSpec, DocumentStore, Filter, FindOptions, Record};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of records per batch artifact.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Person `type` discriminators.
const TYPE_CONTACT: &str = "contact";
const TYPE_CASE: &str = "case";
const TYPE_EVENT: &str = "event";
/// Follow-up state marking a contact as actively monitored.
const FOLLOW_UP_ACTIVE: &str = "ACTIVE";

/// Options for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Incremental filter ANDed onto every collection's selection.
    pub filter: Option<Filter>,
    /// Explicitly requested outbreak ids. Validated against the caller's
    /// scope, then used to narrow it. Empty means the whole scope.
    pub outbreaks: Vec<String>,
    /// Records per batch artifact.
    pub chunk_size: usize,
    /// Emit empty collections as empty batch-0 artifacts, and allow an
    /// entirely empty snapshot.
    pub include_empty: bool,
    /// Disable the catalog's default soft-delete exclusion.
    pub include_deleted: bool,
    /// Trim outbreak-scoped data down to the active subset a peer needs.
    pub redact_for_peer: bool,
    /// Passphrase for per-artifact encryption.
    pub passphrase: Option<String>,
    /// Where to write the final container. Defaults to a unique file in
    /// the system temp directory; the caller owns the result either way.
    pub dest: Option<PathBuf>,
    /// Parent directory for the scratch workspace.
    pub work_root: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            filter: None,
            outbreaks: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_empty: false,
            include_deleted: false,
            redact_for_peer: false,
            passphrase: None,
            dest: None,
            work_root: None,
        }
    }
}

impl ExportOptions {
    /// Sets the incremental filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Requests specific outbreak ids.
    #[must_use]
    pub fn with_outbreaks<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.outbreaks = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Allows empty collections and empty snapshots.
    #[must_use]
    pub fn with_include_empty(mut self) -> Self {
        self.include_empty = true;
        self
    }

    /// Enables per-artifact encryption.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Enables peer-bound redaction.
    #[must_use]
    pub fn with_peer_redaction(mut self) -> Self {
        self.redact_for_peer = true;
        self
    }

    /// Sets the destination path for the container.
    #[must_use]
    pub fn with_dest(mut self, dest: PathBuf) -> Self {
        self.dest = Some(dest);
        self
    }
}

/// Result of an export run.
#[derive(Debug)]
pub struct ExportOutput {
    /// Path of the produced container.
    pub archive: PathBuf,
    /// Total records written across all collections.
    pub record_count: usize,
    /// Total batch artifacts written.
    pub batch_count: usize,
    /// Best-effort failures that did not abort the export.
    pub warnings: Vec<String>,
}

/// Streams collections into snapshot containers.
pub struct Exporter {
    store: Arc<dyn DocumentStore>,
}

impl Exporter {
    /// Creates an exporter over a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Exports the collections selected by `scope` into one container.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutbreaksNotAllowed`] when the options
    /// request outbreak ids outside the caller's scope, and
    /// [`EngineError::NoData`] when nothing matched and `include_empty` is
    /// off; the latter is the distinguished empty outcome, not a failure.
    /// The scratch workspace is removed on every path.
    pub fn export(&self, scope: &AccessScope, options: &ExportOptions) -> EngineResult<ExportOutput> {
        let scope = &self.effective_scope(scope, options)?;
        let specs = scope.selection.resolve();
        let cipher = match &options.passphrase {
            Some(passphrase) => Some(SnapshotCipher::from_passphrase(passphrase)?),
            None => None,
        };

        // The active subset is recomputed in full on every export rather
        // than maintained incrementally.
        let subset = if options.redact_for_peer {
            Some(self.active_subset(scope)?)
        } else {
            None
        };

        let work = match &options.work_root {
            Some(root) => Workdir::under(root)?,
            None => Workdir::new()?,
        };
        let staging = work.subdir("artifacts")?;

        let mut record_count = 0usize;
        let mut batch_count = 0usize;
        let mut warnings = Vec::new();

        for spec in specs {
            let (records, batches) = self.export_collection(
                spec,
                scope,
                subset.as_ref(),
                options,
                &staging,
                cipher.as_ref(),
                &mut warnings,
            )?;
            record_count += records;
            batch_count += batches;
            debug!(
                collection = spec.name,
                records, batches, "collection exported"
            );
        }

        if record_count == 0 && !options.include_empty {
            return Err(EngineError::NoData);
        }

        let dest = options.dest.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("caselink-snapshot-{}.tar.gz", Uuid::new_v4()))
        });
        pack_dir(&staging, &dest)?;

        info!(
            archive = %dest.display(),
            record_count, batch_count, "export complete"
        );
        Ok(ExportOutput {
            archive: dest,
            record_count,
            batch_count,
            warnings,
        })
    }

    /// Checks explicitly requested outbreak ids against the caller's scope
    /// and narrows the scope to them.
    fn effective_scope(
        &self,
        scope: &AccessScope,
        options: &ExportOptions,
    ) -> EngineResult<AccessScope> {
        if options.outbreaks.is_empty() {
            return Ok(scope.clone());
        }
        let validated = scope.outbreaks.validate_requested(&options.outbreaks)?;
        Ok(AccessScope {
            outbreaks: OutbreakScope::from_ids(validated),
            ..scope.clone()
        })
    }

    /// Exports one collection in pages of `chunk_size`.
    #[allow(clippy::too_many_arguments)]
    fn export_collection(
        &self,
        spec: &CollectionSpec,
        scope: &AccessScope,
        subset: Option<&BTreeSet<String>>,
        options: &ExportOptions,
        staging: &std::path::Path,
        cipher: Option<&SnapshotCipher>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<(usize, usize)> {
        let predicate = translate(&collection_filter(spec, scope, subset, options))?;
        let include_deleted = options.include_deleted || !spec.exclude_deleted_by_default;

        let mut record_count = 0usize;
        let mut batch = 0u32;

        loop {
            let mut find = FindOptions::page(batch as usize * options.chunk_size, options.chunk_size);
            find.include_deleted = include_deleted;
            let records = self.store.find(spec.name, &predicate, &find)?;

            if records.is_empty() {
                // Empty collections still produce a batch-0 artifact when
                // empties are requested.
                if batch == 0 && options.include_empty {
                    self.write_batch(spec, batch, &records, staging, cipher, warnings)?;
                    batch += 1;
                }
                break;
            }

            let len = records.len();
            self.write_batch(spec, batch, &records, staging, cipher, warnings)?;
            record_count += len;
            batch += 1;

            // A short page ends this collection's export.
            if len < options.chunk_size {
                break;
            }
        }

        Ok((record_count, batch as usize))
    }

    /// Writes, packs, and optionally encrypts one batch artifact.
    fn write_batch(
        &self,
        spec: &CollectionSpec,
        batch: u32,
        records: &[Record],
        staging: &std::path::Path,
        cipher: Option<&SnapshotCipher>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<()> {
        let name = artifact_name(spec.name, batch);
        let path = staging.join(&name);
        let values: Vec<Value> = records.iter().map(|r| r.clone().into_value()).collect();
        fs::write(&path, serde_json::to_vec(&values)?)?;

        let packed = pack_file(&path)?;
        if let Some(cipher) = cipher {
            cipher.encrypt_file(&packed)?;
        }

        if spec.has_attachments && !records.is_empty() {
            self.copy_attachments(spec, batch, records, staging, cipher, warnings)?;
        }
        Ok(())
    }

    /// Best-effort copy of files referenced by attachment-bearing records.
    ///
    /// A missing source file is a warning, never a batch failure.
    fn copy_attachments(
        &self,
        spec: &CollectionSpec,
        batch: u32,
        records: &[Record],
        staging: &std::path::Path,
        cipher: Option<&SnapshotCipher>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<()> {
        let files_dir = staging.join(format!("{}.{batch}.files", spec.name));
        let mut copied = 0usize;

        for record in records {
            let (Some(id), Some(source)) = (record.id(), record.get("path").and_then(Value::as_str))
            else {
                continue;
            };

            if !std::path::Path::new(source).is_file() {
                let message = format!("{}: attachment file missing: {source}", spec.name);
                warn!(collection = spec.name, source, "attachment file missing");
                warnings.push(message);
                continue;
            }

            if copied == 0 {
                fs::create_dir_all(&files_dir)?;
            }
            fs::copy(source, files_dir.join(id))?;
            copied += 1;
        }

        if copied > 0 {
            let packed = pack_file(&files_dir)?;
            if let Some(cipher) = cipher {
                cipher.encrypt_file(&packed)?;
            }
        }
        Ok(())
    }

    /// Computes the closure of records a peer-bound outbreak export needs:
    /// contacts under active follow-up, cases/events in authorized
    /// locations, and cases/events one relationship hop away from those
    /// contacts. Deeper chains are intentionally not followed.
    fn active_subset(&self, scope: &AccessScope) -> EngineResult<BTreeSet<String>> {
        let scoped = |mut parts: Vec<Filter>| -> Vec<Filter> {
            if let Some(ids) = scope.outbreaks.ids() {
                parts.push(Filter::in_strings("outbreakId", ids.iter().cloned().collect()));
            }
            parts
        };
        let find_all = |filter: Filter| -> EngineResult<Vec<Record>> {
            Ok(self
                .store
                .find("person", &translate(&filter)?, &FindOptions::default())?)
        };

        // Seed: contacts currently under active follow-up.
        let contacts = find_all(Filter::And(scoped(vec![
            Filter::Eq("type".into(), json!(TYPE_CONTACT)),
            Filter::Eq("followUp.status".into(), json!(FOLLOW_UP_ACTIVE)),
        ])))?;
        let mut subset: BTreeSet<String> = contacts
            .iter()
            .filter_map(|r| r.id().map(str::to_owned))
            .collect();

        // Cases and events located in an authorized location.
        if !scope.locations.is_empty() {
            let located = find_all(Filter::And(scoped(vec![
                Filter::In(
                    "type".into(),
                    vec![json!(TYPE_CASE), json!(TYPE_EVENT)],
                ),
                Filter::in_strings(
                    "address.locationId",
                    scope.locations.iter().cloned().collect(),
                ),
            ])))?;
            subset.extend(located.iter().filter_map(|r| r.id().map(str::to_owned)));
        }

        // One relationship hop: cases/events tied to the seed set. A single
        // pass over the relationships expands exactly one hop.
        let relationships = self.store.find(
            "relationship",
            &translate(&Filter::And(scoped(Vec::new())))?,
            &FindOptions::default(),
        )?;
        let mut reached = Vec::new();
        for relationship in &relationships {
            let source = relationship.get("sourceId").and_then(Value::as_str);
            let target = relationship.get("targetId").and_then(Value::as_str);
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };

            let other = if subset.contains(source) && !subset.contains(target) {
                target
            } else if subset.contains(target) && !subset.contains(source) {
                source
            } else {
                continue;
            };

            if let Some(person) = self.store.get("person", other, false)? {
                let kind = person.get("type").and_then(Value::as_str);
                if matches!(kind, Some(TYPE_CASE | TYPE_EVENT)) {
                    reached.push(other.to_owned());
                }
            }
        }
        subset.extend(reached);

        Ok(subset)
    }
}

/// Builds the effective filter for one collection: catalog scope filter,
/// peer redaction, then the caller's incremental filter, all ANDed.
fn collection_filter(
    spec: &CollectionSpec,
    scope: &AccessScope,
    subset: Option<&BTreeSet<String>>,
    options: &ExportOptions,
) -> Filter {
    let mut parts = Vec::new();

    if spec.outbreak_scoped {
        if let Some(ids) = scope.outbreaks.ids() {
            // The outbreak collection is scoped by its own id.
            let field = if spec.name == "outbreak" { "id" } else { "outbreakId" };
            parts.push(Filter::in_strings(field, ids.iter().cloned().collect()));
        }
    }

    if let Some(subset) = subset {
        let ids: Vec<String> = subset.iter().cloned().collect();
        match spec.name {
            "person" => parts.push(Filter::in_strings("id", ids)),
            "follow_up" => parts.push(Filter::in_strings("personId", ids)),
            "relationship" => parts.push(Filter::Or(vec![
                Filter::in_strings("sourceId", ids.clone()),
                Filter::in_strings("targetId", ids),
            ])),
            _ => {}
        }
    }

    if let Some(filter) = &options.filter {
        parts.push(filter.clone());
    }

    Filter::And(parts)
}
