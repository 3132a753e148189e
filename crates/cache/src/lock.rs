//! Cross-process file locks guarding cache entries
//!
//! Readers take a shared lock and writers an exclusive one on a `.lock` file
//! next to the entry directory. The lock is released when the guard drops.

use crate::{Error, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Suffix appended to an entry path to form its lock file
pub const LOCK_SUFFIX: &str = ".lock";

/// Lock file path for a cache entry or stats file
#[must_use]
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// A held lock
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    fn open(path: &Path) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::lock(e, path))
    }

    /// Block until an exclusive lock on `path` is held
    pub fn exclusive(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = Self::open(&path)?;
        FileExt::lock_exclusive(&file).map_err(|e| Error::lock(e, &path))?;
        Ok(Self { path, _file: file })
    }

    /// Block until a shared lock on `path` is held
    pub fn shared(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = Self::open(&path)?;
        FileExt::lock_shared(&file).map_err(|e| Error::lock(e, &path))?;
        Ok(Self { path, _file: file })
    }

    /// The lock file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
