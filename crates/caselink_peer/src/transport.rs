//! Transport seam for talking to upstream peers.
//!
//! The orchestrator only needs two calls against a peer: discover which
//! outbreaks it will accept, and hand it a snapshot archive. Both are
//! blocking; the orchestrator runs them off the async runtime.

use crate::config::PeerDescriptor;
use crate::error::{PeerError, PeerResult};
use caselink_engine::{ImportOptions, Importer, OutbreakScope};
use caselink_store::DocumentStore;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a snapshot upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Job id assigned by the receiving peer, when it reports one.
    pub remote_job_id: Option<String>,
    /// Non-fatal problems the peer reported while applying the snapshot.
    pub warnings: Vec<String>,
}

/// Blocking client for one upstream peer.
pub trait PeerTransport: Send + Sync {
    /// Asks the peer which outbreak ids it will accept from us.
    ///
    /// Empty means the peer accepts everything.
    fn available_outbreaks(&self, peer: &PeerDescriptor) -> PeerResult<Vec<String>>;

    /// Transfers a snapshot archive and waits for the peer to apply it.
    fn upload_snapshot(&self, peer: &PeerDescriptor, archive: &Path) -> PeerResult<UploadReceipt>;
}

/// Scripted transport for tests.
#[derive(Default)]
pub struct MockTransport {
    outbreaks: Mutex<Vec<String>>,
    upload_error: Mutex<Option<String>>,
    upload_warnings: Mutex<Vec<String>>,
    uploads: Mutex<Vec<PathBuf>>,
}

impl MockTransport {
    /// Creates a transport that accepts everything and never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outbreak ids the peer advertises.
    pub fn set_outbreaks(&self, ids: Vec<String>) {
        *self.outbreaks.lock() = ids;
    }

    /// Makes the next uploads fail with the given message.
    pub fn fail_uploads(&self, message: impl Into<String>) {
        *self.upload_error.lock() = Some(message.into());
    }

    /// Attaches warnings to upload receipts.
    pub fn set_upload_warnings(&self, warnings: Vec<String>) {
        *self.upload_warnings.lock() = warnings;
    }

    /// Archives received so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.lock().clone()
    }
}

impl PeerTransport for MockTransport {
    fn available_outbreaks(&self, _peer: &PeerDescriptor) -> PeerResult<Vec<String>> {
        Ok(self.outbreaks.lock().clone())
    }

    fn upload_snapshot(&self, _peer: &PeerDescriptor, archive: &Path) -> PeerResult<UploadReceipt> {
        if let Some(message) = self.upload_error.lock().clone() {
            return Err(PeerError::Transport(message));
        }
        self.uploads.lock().push(archive.to_path_buf());
        Ok(UploadReceipt {
            remote_job_id: Some(uuid::Uuid::new_v4().to_string()),
            warnings: self.upload_warnings.lock().clone(),
        })
    }
}

/// Transport that applies snapshots straight into a local store.
///
/// Stands in for a remote peer in integration tests: the "peer" is a
/// second [`DocumentStore`] in the same process.
pub struct LoopbackTransport {
    target: Arc<dyn DocumentStore>,
    outbreaks: Vec<String>,
    passphrase: Option<String>,
}

impl LoopbackTransport {
    /// Creates a loopback peer backed by the given store.
    #[must_use]
    pub fn new(target: Arc<dyn DocumentStore>) -> Self {
        Self {
            target,
            outbreaks: Vec::new(),
            passphrase: None,
        }
    }

    /// Restricts the outbreaks the loopback peer accepts.
    #[must_use]
    pub fn with_outbreaks(mut self, ids: Vec<String>) -> Self {
        self.outbreaks = ids;
        self
    }

    /// Sets the passphrase used to open received snapshots.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }
}

impl PeerTransport for LoopbackTransport {
    fn available_outbreaks(&self, _peer: &PeerDescriptor) -> PeerResult<Vec<String>> {
        Ok(self.outbreaks.clone())
    }

    fn upload_snapshot(&self, _peer: &PeerDescriptor, archive: &Path) -> PeerResult<UploadReceipt> {
        let mut options =
            ImportOptions::default().with_scope(OutbreakScope::from_ids(self.outbreaks.clone()));
        if let Some(passphrase) = &self.passphrase {
            options = options.with_passphrase(passphrase.clone());
        }
        let importer = Importer::new(Arc::clone(&self.target));
        let output = importer.import(archive, &options)?;
        Ok(UploadReceipt {
            remote_job_id: None,
            warnings: output.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerDescriptor;

    fn peer() -> PeerDescriptor {
        PeerDescriptor {
            url: "https://hub.example.org".into(),
            name: "hub".into(),
            credentials: crate::config::PeerCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            sync_enabled: true,
            auto_encrypt: false,
        }
    }

    #[test]
    fn mock_records_uploads() {
        let transport = MockTransport::new();
        transport.set_outbreaks(vec!["ob-1".into()]);

        assert_eq!(
            transport.available_outbreaks(&peer()).unwrap(),
            vec!["ob-1".to_string()]
        );
        let receipt = transport
            .upload_snapshot(&peer(), Path::new("/tmp/snap.tar.gz"))
            .unwrap();
        assert!(receipt.warnings.is_empty());
        assert_eq!(transport.uploads(), vec![PathBuf::from("/tmp/snap.tar.gz")]);
    }

    #[test]
    fn mock_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_uploads("connection reset");

        let err = transport
            .upload_snapshot(&peer(), Path::new("/tmp/snap.tar.gz"))
            .unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)));
        assert!(transport.uploads().is_empty());
    }
}
