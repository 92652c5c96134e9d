//! Durable job ledger.
//!
//! Every export and sync operation is recorded as a job: created once in
//! `InProgress`, mutated to a terminal state exactly once. After the caller
//! has been acknowledged with a job id, the ledger is the only place
//! outcomes surface.

use crate::error::{PeerError, PeerResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Status of an export or sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job created, work not yet finished.
    InProgress,
    /// Finished cleanly.
    Success,
    /// Finished with non-fatal warnings attached.
    SuccessWithWarnings,
    /// Aborted; the cause is recorded on the job.
    Failed,
}

impl JobStatus {
    /// Returns true once the job can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

/// Ledger record for one export operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    /// Job id, returned to the caller at creation.
    pub id: Uuid,
    /// Outbreaks the export was scoped to.
    pub outbreak_ids: Vec<String>,
    /// Collections the export covered, in catalog order. Together with the
    /// outbreak ids this records the full requested scope, so a mobile
    /// export is distinguishable from a full one after the fact.
    pub collections: Vec<String>,
    /// When the job was created.
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: JobStatus,
    /// Where the produced archive landed.
    pub result_location: Option<PathBuf>,
    /// Rendered cause, when failed.
    pub error: Option<String>,
}

impl ExportJob {
    /// Creates a new in-progress export job covering the given scope.
    #[must_use]
    pub fn new(outbreak_ids: Vec<String>, collections: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbreak_ids,
            collections,
            started_at: Utc::now(),
            completed_at: None,
            status: JobStatus::InProgress,
            result_location: None,
            error: None,
        }
    }
}

/// Ledger record for one outbound sync operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job id, returned to the caller at creation.
    pub id: Uuid,
    /// Upstream peer URL.
    pub peer_url: String,
    /// Outbreaks the peer accepted.
    pub outbreak_ids: Vec<String>,
    /// Incremental lower bound: previous successful sync's start time
    /// minus one minute. `None` means a full sync.
    pub information_start_date: Option<DateTime<Utc>>,
    /// When the job was created.
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: JobStatus,
    /// Peer-reported or local warnings attached without failing the job.
    pub warnings: Vec<String>,
    /// Rendered cause, when failed.
    pub error: Option<String>,
}

impl SyncJob {
    /// Creates a new in-progress sync job against a peer.
    #[must_use]
    pub fn new(peer_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_url: peer_url.into(),
            outbreak_ids: Vec::new(),
            information_start_date: None,
            started_at: Utc::now(),
            completed_at: None,
            status: JobStatus::InProgress,
            warnings: Vec::new(),
            error: None,
        }
    }
}

/// Persistence for job records.
///
/// Callers treat writes as fire-and-forget: a failure here is logged and
/// never aborts the operation the job describes.
pub trait Ledger: Send + Sync {
    /// Persists a new export job.
    fn create_export_job(&self, job: ExportJob) -> PeerResult<()>;

    /// Persists a new sync job.
    fn create_sync_job(&self, job: SyncJob) -> PeerResult<()>;

    /// Fetches an export job by id.
    fn find_export_job(&self, id: Uuid) -> PeerResult<Option<ExportJob>>;

    /// Fetches a sync job by id.
    fn find_sync_job(&self, id: Uuid) -> PeerResult<Option<SyncJob>>;

    /// Returns the most recent successful sync job against a peer.
    fn latest_successful_sync(&self, peer_url: &str) -> PeerResult<Option<SyncJob>>;

    /// Records the resolved scope and incremental bound on a sync job.
    fn record_sync_scope(
        &self,
        id: Uuid,
        outbreak_ids: Vec<String>,
        information_start_date: Option<DateTime<Utc>>,
    ) -> PeerResult<()>;

    /// Moves a sync job to a terminal state.
    ///
    /// Terminal states never regress: completing an already-terminal job
    /// is a logged no-op.
    fn complete_sync_job(
        &self,
        id: Uuid,
        status: JobStatus,
        warnings: Vec<String>,
        error: Option<String>,
    ) -> PeerResult<()>;

    /// Moves an export job to a terminal state. Same no-regression rule.
    fn complete_export_job(
        &self,
        id: Uuid,
        status: JobStatus,
        result_location: Option<PathBuf>,
        error: Option<String>,
    ) -> PeerResult<()>;
}

/// In-memory ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    export_jobs: RwLock<HashMap<Uuid, ExportJob>>,
    sync_jobs: RwLock<HashMap<Uuid, SyncJob>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all sync jobs against a peer, newest first.
    #[must_use]
    pub fn sync_jobs_for(&self, peer_url: &str) -> Vec<SyncJob> {
        let mut jobs: Vec<SyncJob> = self
            .sync_jobs
            .read()
            .values()
            .filter(|j| j.peer_url == peer_url)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }
}

impl Ledger for MemoryLedger {
    fn create_export_job(&self, job: ExportJob) -> PeerResult<()> {
        self.export_jobs.write().insert(job.id, job);
        Ok(())
    }

    fn create_sync_job(&self, job: SyncJob) -> PeerResult<()> {
        self.sync_jobs.write().insert(job.id, job);
        Ok(())
    }

    fn find_export_job(&self, id: Uuid) -> PeerResult<Option<ExportJob>> {
        Ok(self.export_jobs.read().get(&id).cloned())
    }

    fn find_sync_job(&self, id: Uuid) -> PeerResult<Option<SyncJob>> {
        Ok(self.sync_jobs.read().get(&id).cloned())
    }

    fn latest_successful_sync(&self, peer_url: &str) -> PeerResult<Option<SyncJob>> {
        Ok(self
            .sync_jobs_for(peer_url)
            .into_iter()
            .find(|j| j.status == JobStatus::Success))
    }

    fn record_sync_scope(
        &self,
        id: Uuid,
        outbreak_ids: Vec<String>,
        information_start_date: Option<DateTime<Utc>>,
    ) -> PeerResult<()> {
        let mut jobs = self.sync_jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| PeerError::Ledger(format!("sync job {id} not found")))?;
        job.outbreak_ids = outbreak_ids;
        job.information_start_date = information_start_date;
        Ok(())
    }

    fn complete_sync_job(
        &self,
        id: Uuid,
        status: JobStatus,
        warnings: Vec<String>,
        error: Option<String>,
    ) -> PeerResult<()> {
        let mut jobs = self.sync_jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| PeerError::Ledger(format!("sync job {id} not found")))?;

        if job.status.is_terminal() {
            tracing::warn!(job = %id, current = ?job.status, attempted = ?status,
                "ignoring status change on terminal sync job");
            return Ok(());
        }
        job.status = status;
        job.warnings = warnings;
        job.error = error;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    fn complete_export_job(
        &self,
        id: Uuid,
        status: JobStatus,
        result_location: Option<PathBuf>,
        error: Option<String>,
    ) -> PeerResult<()> {
        let mut jobs = self.export_jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| PeerError::Ledger(format!("export job {id} not found")))?;

        if job.status.is_terminal() {
            tracing::warn!(job = %id, current = ?job.status, attempted = ?status,
                "ignoring status change on terminal export job");
            return Ok(());
        }
        job.status = status;
        job.result_location = result_location;
        job.error = error;
        job.completed_at = Some(Utc::now());
        Ok(())
    }
}
