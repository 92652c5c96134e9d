//! Error types for archive operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur while packing, unpacking, or encrypting snapshots.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Underlying file system or stream error.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A container entry would escape the destination directory.
    #[error("archive entry escapes destination: {path:?}")]
    PathEscape {
        /// Offending entry path.
        path: PathBuf,
    },

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong passphrase or corrupted artifact).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The path given to an operation was not usable.
    #[error("invalid archive path {path:?}: {reason}")]
    InvalidPath {
        /// The path in question.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}
