//! Error types for peer synchronization.

use thiserror::Error;

/// Result type for peer operations.
pub type PeerResult<T> = Result<T, PeerError>;

/// Errors that can occur while orchestrating a peer sync.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The URL does not match any configured peer.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// The peer is configured but synchronization is disabled for it.
    #[error("sync disabled for peer: {0}")]
    SyncDisabled(String),

    /// A sync against this peer is already in flight.
    #[error("sync already in progress for peer: {0}")]
    SyncInProgress(String),

    /// The export or import pipeline failed.
    #[error("engine error: {0}")]
    Engine(#[from] caselink_engine::EngineError),

    /// Communication with the peer failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The job ledger could not be read or written.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl PeerError {
    /// Returns true for errors a caller caused (bad request), as opposed
    /// to runtime failures.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PeerError::UnknownPeer(_) | PeerError::SyncDisabled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors() {
        assert!(PeerError::UnknownPeer("x".into()).is_configuration());
        assert!(PeerError::SyncDisabled("x".into()).is_configuration());
        assert!(!PeerError::SyncInProgress("x".into()).is_configuration());
        assert!(!PeerError::Transport("down".into()).is_configuration());
    }

    #[test]
    fn error_display() {
        let err = PeerError::SyncInProgress("https://hub.example.org".into());
        assert!(err.to_string().contains("already in progress"));
    }
}
