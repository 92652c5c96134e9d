//! Scoped working directories.
//!
//! Export and import both stage multi-gigabyte intermediate trees. A
//! [`Workdir`] is acquired for the duration of one operation and removed
//! recursively when dropped, on success and failure alike. The only way to
//! get data out is to move it elsewhere before the guard drops.

use crate::error::ArchiveResult;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A working directory removed on drop.
#[derive(Debug)]
pub struct Workdir {
    dir: TempDir,
}

impl Workdir {
    /// Creates a fresh working directory under the system temp location.
    pub fn new() -> ArchiveResult<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Creates a fresh working directory under `parent`.
    ///
    /// `parent` is created first if missing.
    pub fn under(parent: &Path) -> ArchiveResult<Self> {
        std::fs::create_dir_all(parent)?;
        Ok(Self {
            dir: TempDir::new_in(parent)?,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates and returns a named subdirectory.
    pub fn subdir(&self, name: &str) -> ArchiveResult<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn removed_on_drop() {
        let path;
        {
            let work = Workdir::new().unwrap();
            path = work.path().to_owned();
            fs::write(path.join("batch.json"), b"[]").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn removed_on_unwind() {
        let parent = tempfile::tempdir().unwrap();
        let path = std::sync::Mutex::new(PathBuf::new());

        let result = std::panic::catch_unwind(|| {
            let work = Workdir::under(parent.path()).unwrap();
            *path.lock().unwrap() = work.path().to_owned();
            panic!("export failed mid-flight");
        });

        assert!(result.is_err());
        assert!(!path.lock().unwrap().exists());
    }

    #[test]
    fn subdir_nested_under_root() {
        let work = Workdir::new().unwrap();
        let sub = work.subdir("artifacts").unwrap();
        assert!(sub.starts_with(work.path()));
        assert!(sub.is_dir());
    }
}
