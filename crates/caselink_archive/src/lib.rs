//! # Caselink Archive
//!
//! Snapshot container handling for the Caselink sync engine.
//!
//! A snapshot is one portable gzip-compressed tar container holding nested
//! per-batch artifacts named `<collection>.<batch>.json.zip`. Each nested
//! artifact is itself a small compressed container and may additionally be
//! encrypted with AES-256-GCM, keyed from a passphrase. Encryption is
//! per-artifact, so a partially transferred snapshot remains independently
//! decryptable.
//!
//! This crate provides:
//! - [`pack_dir`] / [`unpack`] for the container ↔ directory round trip
//! - [`SnapshotKey`] / [`SnapshotCipher`] for passphrase-derived encryption
//! - [`Workdir`] for scoped working directories removed on every exit path

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod container;
mod crypto;
mod error;
mod workdir;

pub use container::{artifact_name, pack_dir, pack_file, unpack, ENCRYPTED_SUFFIX};
pub use crypto::{SnapshotCipher, SnapshotKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{ArchiveError, ArchiveResult};
pub use workdir::Workdir;
