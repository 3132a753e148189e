//! Object stores backing the remote tier
//!
//! A store maps `/`-separated object keys to byte blobs. It knows nothing
//! about cache entries; [`crate::RemoteCache`] builds the entry layout on top.

use crate::address::RemoteAddress;
use crate::error::{RemoteError, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A key/value blob store
pub trait RemoteStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Check that the store is reachable
    fn connect(&self) -> Result<()>;

    /// Fetch an object; an absent object is `Ok(None)`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an object, replacing any previous value
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// Open the store an address points at
pub fn open_store(address: &RemoteAddress) -> Result<Arc<dyn RemoteStore>> {
    match address.file_path() {
        Some(root) => Ok(Arc::new(FsRemoteStore::new(root))),
        None => Err(RemoteError::unsupported_scheme(&address.scheme)),
    }
}

/// A store in a shared directory, such as a network mount
#[derive(Debug, Clone)]
pub struct FsRemoteStore {
    root: PathBuf,
}

impl FsRemoteStore {
    /// A store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(RemoteError::serialization(format!(
                    "invalid object key '{key}'"
                )));
            }
            path.push(part);
        }
        Ok(path)
    }
}

impl RemoteStore for FsRemoteStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn connect(&self) -> Result<()> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(RemoteError::connection_failed(
                self.root.display().to_string(),
                "not a directory",
            )),
            Err(e) => Err(RemoteError::connection_failed(
                self.root.display().to_string(),
                e.to_string(),
            )),
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemoteError::io(e, path, "read")),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| RemoteError::io(e, dir, "create_dir_all"))?;

        // Readers on other machines must never see a partial object
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| RemoteError::io(e, dir, "create temp file"))?;
        tmp.write_all(data)
            .map_err(|e| RemoteError::io(e, tmp.path(), "write"))?;
        tmp.persist(&path)
            .map_err(|e| RemoteError::io(e.error, &path, "rename"))?;
        Ok(())
    }
}
