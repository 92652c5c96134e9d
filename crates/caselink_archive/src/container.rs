//! Container codec: directory tree ↔ one portable compressed file.
//!
//! Containers are gzip-compressed tar streams. The same codec serves both
//! levels of a snapshot: the nested per-batch artifacts and the top-level
//! container that folds them together.

use crate::error::{ArchiveError, ArchiveResult};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder};

/// Suffix appended to encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Suffix of a packed artifact.
const PACKED_SUFFIX: &str = ".zip";

/// Builds the canonical nested-artifact name for one batch.
#[must_use]
pub fn artifact_name(collection: &str, batch: u32) -> String {
    format!("{collection}.{batch}.json")
}

/// Packs a directory tree into a single compressed container at `dest`.
///
/// Entry names are relative to `dir`, so unpacking reproduces the tree.
pub fn pack_dir(dir: &Path, dest: &Path) -> ArchiveResult<PathBuf> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    builder.append_dir_all(".", dir)?;
    builder.into_inner()?.finish()?;

    Ok(dest.to_owned())
}

/// Packs one file into a compressed container named `<file>.zip` beside it,
/// removing the source.
///
/// Nested artifacts are packed individually so each one stays independently
/// transferable and decryptable.
pub fn pack_file(path: &Path) -> ArchiveResult<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::InvalidPath {
            path: path.to_owned(),
            reason: "no file name".into(),
        })?
        .to_owned();

    let mut dest = path.as_os_str().to_owned();
    dest.push(PACKED_SUFFIX);
    let dest = PathBuf::from(dest);

    let out = File::create(&dest)?;
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = Builder::new(encoder);

    if path.is_dir() {
        builder.append_dir_all(&name, path)?;
    } else {
        builder.append_file(&name, &mut File::open(path)?)?;
    }
    builder.into_inner()?.finish()?;

    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(dest)
}

/// Unpacks a container into `dest_dir`, creating it if needed.
///
/// Entries that would land outside `dest_dir` are rejected before anything
/// is written for them.
pub fn unpack(archive: &Path, dest_dir: &Path) -> ArchiveResult<()> {
    fs::create_dir_all(dest_dir)?;

    let file = BufReader::new(File::open(archive)?);
    let decoder = GzDecoder::new(file);
    let mut reader = Archive::new(decoder);

    for entry in reader.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        validate_entry_path(&path)?;
        entry.unpack_in(dest_dir)?;
    }
    Ok(())
}

/// Rejects absolute paths and parent-directory traversal.
fn validate_entry_path(path: &Path) -> ArchiveResult<()> {
    let escapes = path.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(ArchiveError::PathEscape {
            path: path.to_owned(),
        });
    }
    Ok(())
}
