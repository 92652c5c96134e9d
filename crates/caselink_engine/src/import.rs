//! Snapshot import pipeline.
//!
//! Unpacks a snapshot container, decrypts nested artifacts with a bounded
//! worker pool, expands them into flat batch files, and applies every record
//! through the merge resolver under the caller's outbreak scope. Each stage
//! advances a processed/total progress counter that can be read while the
//! import runs.
//!
//! Per-artifact failures are recorded, not fatal: the import aborts only
//! when no usable data remains, otherwise it completes as a partial success
//! with the failures retained for inspection.

use crate::error::{EngineError, EngineResult};
use crate::merge::{merge, MergeAction};
use crate::scope::OutbreakScope;
use caselink_archive::{unpack, SnapshotCipher, Workdir, ENCRYPTED_SUFFIX};
use caselink_store::{spec_for, DocumentStore, Record};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Default size of the decrypt worker pool.
pub const DEFAULT_DECRYPT_PARALLELISM: usize = 10;

/// Options for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Passphrase for encrypted artifacts.
    pub passphrase: Option<String>,
    /// Size of the bounded decrypt pool.
    pub decrypt_parallelism: usize,
    /// Outbreaks the importing caller may accept; out-of-scope records are
    /// silently skipped.
    pub scope: OutbreakScope,
    /// Parent directory for the scratch workspace.
    pub work_root: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            passphrase: None,
            decrypt_parallelism: DEFAULT_DECRYPT_PARALLELISM,
            scope: OutbreakScope::Unrestricted,
            work_root: None,
        }
    }
}

impl ImportOptions {
    /// Sets the decryption passphrase.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Sets the outbreak scope.
    #[must_use]
    pub fn with_scope(mut self, scope: OutbreakScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Which stage of the pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    /// No import in flight.
    Idle,
    /// Unpacking the top-level container.
    Unpacking,
    /// Decrypting nested artifacts.
    Decrypting,
    /// Expanding nested artifacts into batch files.
    Expanding,
    /// Merging batch records into the store.
    Applying,
    /// Pipeline finished.
    Done,
}

/// Point-in-time view of import progress.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    /// Current stage.
    pub stage: ImportStage,
    /// Units completed within the stage.
    pub processed: usize,
    /// Units the stage will process in total.
    pub total: usize,
}

/// Counts of merge outcomes across one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records removed (deletion applied).
    pub removed: usize,
    /// Records left untouched (local was newer or equal).
    pub untouched: usize,
    /// Records skipped as out of scope.
    pub skipped: usize,
}

impl ImportStats {
    /// Total records that passed through the resolver.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.removed + self.untouched
    }

    fn count(&mut self, action: MergeAction) {
        match action {
            MergeAction::Created => self.created += 1,
            MergeAction::Updated => self.updated += 1,
            MergeAction::Removed => self.removed += 1,
            MergeAction::Untouched => self.untouched += 1,
        }
    }
}

/// Result of an import run.
#[derive(Debug)]
pub struct ImportOutput {
    /// Merge outcome counts.
    pub stats: ImportStats,
    /// Per-artifact failures that did not abort the import.
    pub failures: Vec<String>,
}

/// A snapshot unpacked down to flat batch files.
///
/// Holds the scratch workspace open; dropping it removes the batch files.
#[derive(Debug)]
pub struct UnpackedSnapshot {
    /// Directory of `<collection>.<batch>.json` files.
    pub batch_dir: PathBuf,
    /// Per-artifact failures encountered while unpacking or decrypting.
    pub failures: Vec<String>,
    _work: Workdir,
}

/// Applies snapshot archives to a document store.
pub struct Importer {
    store: Arc<dyn DocumentStore>,
    progress: Mutex<ProgressSnapshot>,
}

impl Importer {
    /// Creates an importer over a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            progress: Mutex::new(ProgressSnapshot {
                stage: ImportStage::Idle,
                processed: 0,
                total: 0,
            }),
        }
    }

    /// Returns the current pipeline progress.
    pub fn progress(&self) -> ProgressSnapshot {
        *self.progress.lock()
    }

    fn enter_stage(&self, stage: ImportStage, total: usize) {
        *self.progress.lock() = ProgressSnapshot {
            stage,
            processed: 0,
            total,
        };
    }

    fn advance(&self) {
        self.progress.lock().processed += 1;
    }

    /// Imports a snapshot archive: unpack, decrypt, expand, apply.
    ///
    /// # Errors
    ///
    /// Fails when the container itself is unreadable, when encrypted
    /// artifacts arrive without a passphrase, or when every artifact
    /// failed ([`EngineError::NothingUsable`]). Artifact-level failures
    /// with usable data remaining are reported in the output instead.
    pub fn import(&self, archive: &Path, options: &ImportOptions) -> EngineResult<ImportOutput> {
        let unpacked = self.unpack_snapshot(archive, options)?;
        let (stats, mut failures) = self.apply_batches(&unpacked.batch_dir, &options.scope)?;
        let mut all_failures = unpacked.failures;
        all_failures.append(&mut failures);

        let had_artifacts = stats.applied() + stats.skipped > 0;
        if !all_failures.is_empty() && !had_artifacts {
            return Err(EngineError::NothingUsable {
                failures: all_failures,
            });
        }

        self.enter_stage(ImportStage::Done, 0);
        info!(
            created = stats.created,
            updated = stats.updated,
            removed = stats.removed,
            untouched = stats.untouched,
            skipped = stats.skipped,
            failures = all_failures.len(),
            "import complete"
        );
        Ok(ImportOutput {
            stats,
            failures: all_failures,
        })
    }

    /// Unpacks a snapshot down to flat batch files without applying them.
    ///
    /// The returned value keeps the scratch workspace alive; the caller
    /// loads the batch files and drops it when done.
    pub fn unpack_snapshot(
        &self,
        archive: &Path,
        options: &ImportOptions,
    ) -> EngineResult<UnpackedSnapshot> {
        let work = match &options.work_root {
            Some(root) => Workdir::under(root)?,
            None => Workdir::new()?,
        };
        let nested_dir = work.subdir("nested")?;
        let batch_dir = work.subdir("batches")?;

        self.enter_stage(ImportStage::Unpacking, 1);
        unpack(archive, &nested_dir)?;
        self.advance();

        let mut failures = Vec::new();
        let encrypted = files_with_suffix(&nested_dir, ENCRYPTED_SUFFIX)?;
        if !encrypted.is_empty() {
            let Some(passphrase) = &options.passphrase else {
                return Err(EngineError::PassphraseRequired);
            };
            let cipher = SnapshotCipher::from_passphrase(passphrase)?;

            self.enter_stage(ImportStage::Decrypting, encrypted.len());
            failures.extend(self.decrypt_pool(
                &cipher,
                &encrypted,
                options.decrypt_parallelism.max(1),
            ));
        }

        let artifacts = files_with_suffix(&nested_dir, ".zip")?;
        self.enter_stage(ImportStage::Expanding, artifacts.len());
        for artifact in &artifacts {
            if let Err(error) = unpack(artifact, &batch_dir) {
                let name = display_name(artifact);
                warn!(artifact = %name, %error, "nested artifact failed to unpack");
                failures.push(format!("{name}: {error}"));
            }
            self.advance();
        }

        Ok(UnpackedSnapshot {
            batch_dir,
            failures,
            _work: work,
        })
    }

    /// Decrypts artifacts with a fixed pool of workers, collecting
    /// per-artifact failures.
    fn decrypt_pool(
        &self,
        cipher: &SnapshotCipher,
        files: &[PathBuf],
        parallelism: usize,
    ) -> Vec<String> {
        let next = AtomicUsize::new(0);
        let failures = Mutex::new(Vec::new());
        let workers = parallelism.min(files.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(file) = files.get(index) else {
                        break;
                    };
                    if let Err(error) = cipher.decrypt_file(file) {
                        let name = display_name(file);
                        warn!(artifact = %name, %error, "artifact failed to decrypt");
                        failures.lock().push(format!("{name}: {error}"));
                    }
                    self.advance();
                });
            }
        });

        failures.into_inner()
    }

    /// Loads every batch file and runs the merge resolver per record.
    ///
    /// Records whose outbreak scope key is not permitted are silently
    /// skipped. Returns stats plus per-batch failures (malformed files).
    pub fn apply_batches(
        &self,
        batch_dir: &Path,
        scope: &OutbreakScope,
    ) -> EngineResult<(ImportStats, Vec<String>)> {
        let mut batches = files_with_suffix(batch_dir, ".json")?;
        batches.sort();

        self.enter_stage(ImportStage::Applying, batches.len());

        let mut stats = ImportStats::default();
        let mut failures = Vec::new();

        for batch in &batches {
            let name = display_name(batch);
            let Some(collection) = name.split('.').next().filter(|c| !c.is_empty()) else {
                failures.push(format!("{name}: unrecognized batch file name"));
                self.advance();
                continue;
            };

            let values: Vec<serde_json::Value> = match fs::read(batch)
                .map_err(EngineError::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(EngineError::from))
            {
                Ok(values) => values,
                Err(error) => {
                    warn!(batch = %name, %error, "batch file unreadable");
                    failures.push(format!("{name}: {error}"));
                    self.advance();
                    continue;
                }
            };

            for value in values {
                let record = Record::from_value(value)?;
                if !in_scope(collection, &record, scope) {
                    stats.skipped += 1;
                    continue;
                }
                let outcome = merge(self.store.as_ref(), collection, record)?;
                stats.count(outcome.action);
            }
            self.advance();
        }

        Ok((stats, failures))
    }
}

/// Returns true if the record may cross into this replica.
///
/// Only catalog-declared outbreak-scoped collections are checked; the
/// outbreak collection itself is keyed by its own record id.
fn in_scope(collection: &str, record: &Record, scope: &OutbreakScope) -> bool {
    let scoped = spec_for(collection).is_some_and(|spec| spec.outbreak_scoped);
    if !scoped {
        return true;
    }
    let key = if collection == "outbreak" {
        record.id()
    } else {
        record.outbreak_id()
    };
    scope.permits(key)
}

fn files_with_suffix(dir: &Path, suffix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportOptions, Exporter};
    use crate::scope::{AccessScope, CollectionSelection};
    use caselink_store::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn seeded_store(values: Vec<serde_json::Value>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed("person", values).unwrap();
        store
    }

    fn export_people(store: Arc<MemoryStore>, options: ExportOptions) -> PathBuf {
        let scope = AccessScope {
            outbreaks: OutbreakScope::Unrestricted,
            locations: BTreeSet::new(),
            selection: CollectionSelection::Explicit(vec!["person".into()]),
        };
        Exporter::new(store).export(&scope, &options).unwrap().archive
    }

    #[test]
    fn roundtrip_into_empty_replica() {
        let source = seeded_store(vec![
            json!({"id": "p-1", "updatedAt": "2024-05-01T10:00:00Z", "name": "Ada"}),
            json!({"id": "p-2", "updatedAt": "2024-05-01T11:00:00Z", "name": "Grace"}),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            source,
            ExportOptions::default().with_dest(dir.path().join("snap.tar.gz")),
        );

        let target = Arc::new(MemoryStore::new());
        let importer = Importer::new(Arc::clone(&target) as Arc<dyn DocumentStore>);
        let output = importer.import(&archive, &ImportOptions::default()).unwrap();

        assert_eq!(output.stats.created, 2);
        assert!(output.failures.is_empty());
        let restored = target.get("person", "p-1", false).unwrap().unwrap();
        assert_eq!(restored.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn reimport_is_idempotent() {
        let source = seeded_store(vec![
            json!({"id": "p-1", "updatedAt": "2024-05-01T10:00:00Z"}),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            source,
            ExportOptions::default().with_dest(dir.path().join("snap.tar.gz")),
        );

        let target = Arc::new(MemoryStore::new());
        let importer = Importer::new(Arc::clone(&target) as Arc<dyn DocumentStore>);

        let first = importer.import(&archive, &ImportOptions::default()).unwrap();
        assert_eq!(first.stats.created, 1);

        let second = importer.import(&archive, &ImportOptions::default()).unwrap();
        assert_eq!(second.stats.untouched, 1);
        assert_eq!(second.stats.created, 0);
    }

    #[test]
    fn encrypted_roundtrip() {
        let source = seeded_store(vec![
            json!({"id": "p-1", "updatedAt": "2024-05-01T10:00:00Z"}),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            source,
            ExportOptions::default()
                .with_passphrase("topsecret")
                .with_dest(dir.path().join("snap.tar.gz")),
        );

        let target = Arc::new(MemoryStore::new());
        let importer = Importer::new(target);

        // Without the passphrase the import fails fast.
        let err = importer.import(&archive, &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::PassphraseRequired));

        let output = importer
            .import(&archive, &ImportOptions::default().with_passphrase("topsecret"))
            .unwrap();
        assert_eq!(output.stats.created, 1);
    }

    #[test]
    fn wrong_passphrase_leaves_nothing_usable() {
        let source = seeded_store(vec![
            json!({"id": "p-1", "updatedAt": "2024-05-01T10:00:00Z"}),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            source,
            ExportOptions::default()
                .with_passphrase("right")
                .with_dest(dir.path().join("snap.tar.gz")),
        );

        let importer = Importer::new(Arc::new(MemoryStore::new()));
        let err = importer
            .import(&archive, &ImportOptions::default().with_passphrase("wrong"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NothingUsable { .. }));
    }

    #[test]
    fn out_of_scope_records_skipped() {
        let source = Arc::new(MemoryStore::new());
        source
            .seed(
                "person",
                vec![
                    json!({"id": "a", "updatedAt": "2024-05-01T10:00:00Z", "outbreakId": "ob-1"}),
                    json!({"id": "b", "updatedAt": "2024-05-01T10:00:00Z", "outbreakId": "ob-2"}),
                ],
            )
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            source,
            ExportOptions::default().with_dest(dir.path().join("snap.tar.gz")),
        );

        let target = Arc::new(MemoryStore::new());
        let importer = Importer::new(Arc::clone(&target) as Arc<dyn DocumentStore>);
        let output = importer
            .import(
                &archive,
                &ImportOptions::default().with_scope(OutbreakScope::from_ids(vec!["ob-1"])),
            )
            .unwrap();

        assert_eq!(output.stats.created, 1);
        assert_eq!(output.stats.skipped, 1);
        assert!(target.get("person", "b", true).unwrap().is_none());
    }

    #[test]
    fn corrupted_artifact_is_partial_success() {
        // Two batches of one record each.
        let source = seeded_store(vec![
            json!({"id": "p-1", "updatedAt": "2024-05-01T10:00:00Z"}),
            json!({"id": "p-2", "updatedAt": "2024-05-01T10:00:00Z"}),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            Arc::clone(&source),
            ExportOptions::default()
                .with_chunk_size(1)
                .with_dest(dir.path().join("snap.tar.gz")),
        );

        // Corrupt one nested artifact inside the container.
        let stage = tempfile::tempdir().unwrap();
        caselink_archive::unpack(&archive, stage.path()).unwrap();
        let mut artifacts = files_with_suffix(stage.path(), ".zip").unwrap();
        artifacts.sort();
        fs::write(&artifacts[0], b"garbage").unwrap();
        let corrupted = dir.path().join("corrupted.tar.gz");
        caselink_archive::pack_dir(stage.path(), &corrupted).unwrap();

        let importer = Importer::new(Arc::new(MemoryStore::new()));
        let output = importer.import(&corrupted, &ImportOptions::default()).unwrap();

        assert_eq!(output.stats.created, 1);
        assert_eq!(output.failures.len(), 1);
    }

    #[test]
    fn progress_reaches_done() {
        let source = seeded_store(vec![
            json!({"id": "p-1", "updatedAt": "2024-05-01T10:00:00Z"}),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = export_people(
            source,
            ExportOptions::default().with_dest(dir.path().join("snap.tar.gz")),
        );

        let importer = Importer::new(Arc::new(MemoryStore::new()));
        assert_eq!(importer.progress().stage, ImportStage::Idle);

        importer.import(&archive, &ImportOptions::default()).unwrap();
        assert_eq!(importer.progress().stage, ImportStage::Done);
    }
}
