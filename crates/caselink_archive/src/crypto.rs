//! Snapshot encryption using AES-256-GCM.
//!
//! Keys are derived from a passphrase with HKDF-SHA256. The passphrase
//! itself comes from an explicit secret or from concatenated peer credential
//! fields; it is never stored or transmitted.

use crate::error::{ArchiveError, ArchiveResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Domain salt for snapshot key derivation.
///
/// Fixed rather than random: both sides of a transfer must derive the same
/// key from the same passphrase with no side channel for a salt.
const KDF_SALT: &[u8] = b"caselink-snapshot-kdf-salt";
const KDF_INFO: &[u8] = b"caselink-snapshot-key-v1";

/// Symmetric key for snapshot artifacts.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SnapshotKey {
    bytes: [u8; KEY_SIZE],
}

impl SnapshotKey {
    /// Derives a key from a passphrase using HKDF-SHA256.
    pub fn derive(passphrase: &str) -> ArchiveResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), passphrase.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut bytes)
            .map_err(|_| ArchiveError::KeyDerivationFailed("HKDF expand failed".into()))?;

        Ok(Self { bytes })
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> ArchiveResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(ArchiveError::KeyDerivationFailed(format!(
                "expected {KEY_SIZE} key bytes, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts snapshot artifacts.
///
/// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct SnapshotCipher {
    cipher: Aes256Gcm,
}

impl SnapshotCipher {
    /// Creates a cipher from a key.
    #[must_use]
    pub fn new(key: &SnapshotKey) -> Self {
        // Infallible: SnapshotKey is always exactly KEY_SIZE bytes.
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Creates a cipher directly from a passphrase.
    pub fn from_passphrase(passphrase: &str) -> ArchiveResult<Self> {
        Ok(Self::new(&SnapshotKey::derive(passphrase)?))
    }

    /// Encrypts a buffer, prepending a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> ArchiveResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| ArchiveError::EncryptionFailed("encryption error".into()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    /// Decrypts a buffer produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, ciphertext: &[u8]) -> ArchiveResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ArchiveError::DecryptionFailed(
                "ciphertext too short".into(),
            ));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &ciphertext[NONCE_SIZE..])
            .map_err(|_| ArchiveError::DecryptionFailed("wrong key or corrupted data".into()))
    }

    /// Encrypts a file in place, writing `<path>.enc` and removing the source.
    pub fn encrypt_file(&self, path: &Path) -> ArchiveResult<PathBuf> {
        let plaintext = fs::read(path)?;
        let encrypted = self.encrypt(&plaintext)?;

        let mut dest = path.as_os_str().to_owned();
        dest.push(crate::container::ENCRYPTED_SUFFIX);
        let dest = PathBuf::from(dest);

        fs::write(&dest, encrypted)?;
        fs::remove_file(path)?;
        Ok(dest)
    }

    /// Decrypts a `<name>.enc` file, restoring `<name>` and removing the source.
    pub fn decrypt_file(&self, path: &Path) -> ArchiveResult<PathBuf> {
        let name = path
            .to_str()
            .and_then(|p| p.strip_suffix(crate::container::ENCRYPTED_SUFFIX))
            .ok_or_else(|| ArchiveError::InvalidPath {
                path: path.to_owned(),
                reason: "not an encrypted artifact".into(),
            })?;

        let ciphertext = fs::read(path)?;
        let plaintext = self.decrypt(&ciphertext)?;

        let dest = PathBuf::from(name);
        fs::write(&dest, plaintext)?;
        fs::remove_file(path)?;
        Ok(dest)
    }
}

impl std::fmt::Debug for SnapshotCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
