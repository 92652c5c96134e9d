//! Detached sync and export orchestration.
//!
//! Callers are acknowledged with a job id as soon as the job is in the
//! ledger; the pipeline itself runs on a detached task and reports only
//! through the ledger and logs. Export and upload are blocking work and
//! run on the blocking thread pool.

use crate::config::{PeerDescriptor, PeerRegistry};
use crate::error::{PeerError, PeerResult};
use crate::ledger::{ExportJob, JobStatus, Ledger, SyncJob};
use crate::registry::InProgressRegistry;
use crate::transport::PeerTransport;
use caselink_engine::{AccessScope, ExportOptions, Exporter, DEFAULT_CHUNK_SIZE};
use caselink_store::{DocumentStore, ExportType, Filter};
use chrono::{Duration, SecondsFormat};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Guard subtracted from the previous successful sync's start time when
/// computing the incremental lower bound, so records written during a
/// small clock drift between nodes are not skipped.
pub const SYNC_CLOCK_SKEW: Duration = Duration::seconds(60);

/// Static orchestration settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Export type for snapshots produced by sync runs.
    pub export_type: ExportType,
    /// Trim outbound snapshots to the active subset each peer needs.
    pub redact_for_peer: bool,
    /// Records per batch artifact.
    pub chunk_size: usize,
    /// Parent directory for scratch workspaces.
    pub work_root: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            export_type: ExportType::Mobile,
            redact_for_peer: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            work_root: None,
        }
    }
}

impl OrchestratorConfig {
    /// Sets the export type used for sync snapshots.
    #[must_use]
    pub fn with_export_type(mut self, export_type: ExportType) -> Self {
        self.export_type = export_type;
        self
    }

    /// Enables peer-bound redaction on sync snapshots.
    #[must_use]
    pub fn with_peer_redaction(mut self) -> Self {
        self.redact_for_peer = true;
        self
    }

    /// Sets the batch size for sync snapshots.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the parent directory for scratch workspaces.
    #[must_use]
    pub fn with_work_root(mut self, work_root: PathBuf) -> Self {
        self.work_root = Some(work_root);
        self
    }
}

/// Drives exports and outbound syncs against configured peers.
pub struct Orchestrator<T> {
    store: Arc<dyn DocumentStore>,
    peers: PeerRegistry,
    ledger: Arc<dyn Ledger>,
    registry: InProgressRegistry,
    transport: Arc<T>,
    config: OrchestratorConfig,
}

impl<T: PeerTransport + 'static> Orchestrator<T> {
    /// Creates an orchestrator over a store, peer set and transport.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        peers: PeerRegistry,
        ledger: Arc<dyn Ledger>,
        transport: Arc<T>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            peers,
            ledger,
            registry: InProgressRegistry::new(),
            transport,
            config,
        }
    }

    /// Read access to the job ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Returns true when a sync against the peer is in flight.
    #[must_use]
    pub fn is_syncing(&self, peer_url: &str) -> bool {
        self.registry.is_running(peer_url)
    }

    /// Starts a sync against an upstream peer and returns its job id.
    ///
    /// Returns as soon as the job is recorded; the pipeline runs detached
    /// and its outcome lands in the ledger. At most one sync per peer is
    /// in flight: a request during a run is remembered and retriggered
    /// once the run finishes, and the caller gets
    /// [`PeerError::SyncInProgress`]. `force` starts a run regardless,
    /// without touching the running one's slot.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails fast on unknown or sync-disabled peers, before any job is
    /// created.
    pub fn sync_with_upstream(self: &Arc<Self>, peer_url: &str, force: bool) -> PeerResult<Uuid> {
        let peer = self.peers.resolve(peer_url)?.clone();

        let owns_slot = self.registry.try_begin(peer_url);
        if !owns_slot && !force {
            self.registry.defer(peer_url);
            info!(peer = peer_url, "sync already running, deferring one retrigger");
            return Err(PeerError::SyncInProgress(peer_url.to_owned()));
        }

        let job = SyncJob::new(peer_url);
        let job_id = job.id;
        if let Err(err) = self.ledger.create_sync_job(job) {
            error!(job = %job_id, %err, "failed to record sync job");
        }
        info!(job = %job_id, peer = peer_url, force, "sync started");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&this);
            let blocking_peer = peer.clone();
            let outcome =
                tokio::task::spawn_blocking(move || worker.run_sync(job_id, &blocking_peer))
                    .await
                    .unwrap_or_else(|join_err| {
                        Err(PeerError::Transport(format!("sync task panicked: {join_err}")))
                    });
            this.finalize_sync(job_id, &peer.url, owns_slot, outcome);
        });

        Ok(job_id)
    }

    /// Produces a ledgered snapshot export and returns its job id.
    ///
    /// Same acknowledgement contract as [`Orchestrator::sync_with_upstream`]:
    /// the archive path lands on the completed job's `result_location`.
    pub fn export_snapshot(
        self: &Arc<Self>,
        scope: AccessScope,
        options: ExportOptions,
    ) -> PeerResult<Uuid> {
        let outbreak_ids = scope
            .outbreaks
            .ids()
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let collections = scope
            .selection
            .resolve()
            .iter()
            .map(|spec| spec.name.to_owned())
            .collect();
        let job = ExportJob::new(outbreak_ids, collections);
        let job_id = job.id;
        if let Err(err) = self.ledger.create_export_job(job) {
            error!(job = %job_id, %err, "failed to record export job");
        }
        info!(job = %job_id, "export started");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&this);
            let outcome = tokio::task::spawn_blocking(move || {
                let exporter = Exporter::new(Arc::clone(&worker.store));
                exporter.export(&scope, &options).map_err(PeerError::from)
            })
            .await
            .unwrap_or_else(|join_err| {
                Err(PeerError::Transport(format!("export task panicked: {join_err}")))
            });

            let write = match outcome {
                Ok(output) => {
                    for warning in &output.warnings {
                        warn!(job = %job_id, %warning, "export warning");
                    }
                    info!(job = %job_id, records = output.record_count, "export finished");
                    this.ledger.complete_export_job(
                        job_id,
                        JobStatus::Success,
                        Some(output.archive),
                        None,
                    )
                }
                Err(err) => {
                    error!(job = %job_id, %err, "export failed");
                    this.ledger.complete_export_job(
                        job_id,
                        JobStatus::Failed,
                        None,
                        Some(err.to_string()),
                    )
                }
            };
            if let Err(err) = write {
                error!(job = %job_id, %err, "failed to complete export job");
            }
        });

        Ok(job_id)
    }

    /// The blocking half of a sync run: export, upload, clean up.
    ///
    /// Returns the accumulated warnings on success. An empty store (or an
    /// incremental run with no changes since the bound) is a success with
    /// nothing sent.
    fn run_sync(&self, job_id: Uuid, peer: &PeerDescriptor) -> PeerResult<Vec<String>> {
        let accepted = self.transport.available_outbreaks(peer)?;
        debug!(job = %job_id, outbreaks = accepted.len(), "peer scope resolved");

        let bound = match self.ledger.latest_successful_sync(&peer.url) {
            Ok(previous) => previous.map(|job| job.started_at - SYNC_CLOCK_SKEW),
            Err(err) => {
                warn!(job = %job_id, %err, "ledger lookup failed, falling back to full sync");
                None
            }
        };
        if let Err(err) = self
            .ledger
            .record_sync_scope(job_id, accepted.clone(), bound)
        {
            warn!(job = %job_id, %err, "failed to record sync scope");
        }

        let scope = AccessScope::for_outbreaks(self.config.export_type, accepted);
        let mut options = ExportOptions {
            chunk_size: self.config.chunk_size,
            // Deletions must reach the peer to take effect there.
            include_deleted: true,
            redact_for_peer: self.config.redact_for_peer,
            passphrase: peer.snapshot_passphrase(),
            work_root: self.config.work_root.clone(),
            ..ExportOptions::default()
        };
        if let Some(bound) = bound {
            options.filter = Some(Filter::Gte(
                "updatedAt".into(),
                Value::String(bound.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ));
        }

        let exporter = Exporter::new(Arc::clone(&self.store));
        let output = match exporter.export(&scope, &options) {
            Ok(output) => output,
            // Nothing changed since the bound; a successful no-op.
            Err(err) if err.is_no_data() => {
                info!(job = %job_id, "no changes to sync");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut warnings = output.warnings;
        let upload = self.transport.upload_snapshot(peer, &output.archive);
        if let Err(err) = fs::remove_file(&output.archive) {
            debug!(job = %job_id, %err, "leaving snapshot behind");
        }
        let receipt = upload?;
        if let Some(remote) = &receipt.remote_job_id {
            debug!(job = %job_id, %remote, "peer acknowledged snapshot");
        }
        warnings.extend(receipt.warnings);
        Ok(warnings)
    }

    /// Writes the terminal status, releases the slot and retriggers a
    /// deferred request if one arrived during the run.
    fn finalize_sync(
        self: &Arc<Self>,
        job_id: Uuid,
        peer_url: &str,
        owns_slot: bool,
        outcome: PeerResult<Vec<String>>,
    ) {
        let write = match outcome {
            Ok(warnings) => {
                let status = if warnings.is_empty() {
                    JobStatus::Success
                } else {
                    JobStatus::SuccessWithWarnings
                };
                info!(job = %job_id, peer = peer_url, ?status, "sync finished");
                self.ledger.complete_sync_job(job_id, status, warnings, None)
            }
            Err(err) => {
                error!(job = %job_id, peer = peer_url, %err, "sync failed");
                self.ledger
                    .complete_sync_job(job_id, JobStatus::Failed, Vec::new(), Some(err.to_string()))
            }
        };
        if let Err(err) = write {
            error!(job = %job_id, %err, "failed to complete sync job");
        }

        // Forced runs never took the slot, so they must not release it.
        if owns_slot && self.registry.finish(peer_url) {
            info!(peer = peer_url, "retriggering deferred sync");
            if let Err(err) = self.sync_with_upstream(peer_url, false) {
                warn!(peer = peer_url, %err, "deferred sync failed to start");
            }
        }
    }
}
