//! The remote cache tier
//!
//! Entries live in the store as `<hash>/.entry` (the JSON entry record) plus
//! one object per file at `<hash>/<file id>`, compressed as the record says.
//! The record is written last.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result as RemoteResult};
use crate::retry::{retry_with_backoff, run_with_timeout};
use crate::store::RemoteStore;
use buildstash_cache::{
    CacheEntry, CacheTier, Compression, EntryRecord, Error, Result, StoredFile, validate_key,
};
use std::path::Path;
use std::sync::{Arc, OnceLock};

const ENTRY_OBJECT: &str = ".entry";

/// Object key of a file stored with an entry
#[must_use]
pub fn object_key(hash: &str, file_id: &str) -> String {
    format!("{hash}/{file_id}")
}

/// A [`CacheTier`] over a [`RemoteStore`]
///
/// Connects on first use. The outcome of that attempt is kept for the life
/// of the tier: once connecting has failed, every call fails immediately
/// with [`Error::Unavailable`].
pub struct RemoteCache {
    store: Arc<dyn RemoteStore>,
    config: RemoteConfig,
    connection: OnceLock<std::result::Result<(), String>>,
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RemoteCache {
    /// Create a tier over `store`
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, config: RemoteConfig) -> Self {
        Self {
            store,
            config,
            connection: OnceLock::new(),
        }
    }

    fn unavailable(&self, err: RemoteError) -> Error {
        err.into_cache_error(self.store.name())
    }

    fn ensure_connected(&self) -> Result<()> {
        let outcome = self.connection.get_or_init(|| {
            let store = Arc::clone(&self.store);
            let connected =
                run_with_timeout(self.config.connect_timeout(), "connect", move || {
                    store.connect()
                });
            match connected {
                Ok(()) => {
                    tracing::debug!(
                        store = self.store.name(),
                        address = %self.config.address,
                        "Connected to remote cache"
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(
                        store = self.store.name(),
                        address = %self.config.address,
                        error = %e,
                        "Remote cache unreachable, disabling it for this process"
                    );
                    Err(e.to_string())
                }
            }
        });
        outcome
            .clone()
            .map_err(|reason| Error::unavailable(self.store.name(), reason))
    }

    fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>> {
        retry_with_backoff(&self.config.retry, "get", || {
            let store = Arc::clone(&self.store);
            let key = key.to_string();
            run_with_timeout(self.config.transfer_timeout(), "get", move || {
                store.get(&key)
            })
        })
    }

    fn put(&self, key: &str, data: Vec<u8>) -> RemoteResult<()> {
        let data = Arc::new(data);
        retry_with_backoff(&self.config.retry, "put", || {
            let store = Arc::clone(&self.store);
            let key = key.to_string();
            let data = Arc::clone(&data);
            run_with_timeout(self.config.transfer_timeout(), "put", move || {
                store.put(&key, &data)
            })
        })
    }

    fn file_bytes(hash: &str, file_id: &str, file: &StoredFile) -> Result<Vec<u8>> {
        match file {
            StoredFile::Inline(data) => Ok(data.clone()),
            StoredFile::OnDisk(path) if path.is_dir() => Err(Error::configuration(format!(
                "directory output '{file_id}' cannot be stored remotely"
            ))),
            StoredFile::OnDisk(path) => {
                std::fs::read(path).map_err(|e| Error::io(e, path, "read"))
            }
            StoredFile::Remote(key) => Err(Error::inconsistent(
                hash,
                format!("file '{file_id}' refers to remote object '{key}'"),
            )),
        }
    }
}

impl CacheTier for RemoteCache {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn find(&self, hash: &str) -> Result<Option<CacheEntry>> {
        validate_key(hash)?;
        self.ensure_connected()?;

        let key = object_key(hash, ENTRY_OBJECT);
        let Some(data) = self.get(&key).map_err(|e| self.unavailable(e))? else {
            return Ok(None);
        };
        let record = EntryRecord::from_json(&data, Path::new(&key))?;
        Ok(Some(record.into_entry(|id| {
            StoredFile::Remote(object_key(hash, id))
        })))
    }

    fn insert(&self, hash: &str, entry: &CacheEntry, _allow_hard_links: bool) -> Result<()> {
        validate_key(hash)?;
        entry.validate_file_ids()?;
        self.ensure_connected()?;

        for (file_id, file) in &entry.files {
            let data = entry
                .compression
                .compress(&Self::file_bytes(hash, file_id, file)?)?;
            self.put(&object_key(hash, file_id), data)
                .map_err(|e| self.unavailable(e))?;
        }

        let record = entry.to_record().to_json()?;
        self.put(&object_key(hash, ENTRY_OBJECT), record)
            .map_err(|e| self.unavailable(e))?;

        tracing::debug!(
            hash = %hash,
            files = entry.files.len(),
            store = self.store.name(),
            "Stored entry in remote cache"
        );
        Ok(())
    }

    fn read_file(
        &self,
        hash: &str,
        file_id: &str,
        file: &StoredFile,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        let StoredFile::Remote(key) = file else {
            return compression.decompress(&Self::file_bytes(hash, file_id, file)?);
        };
        self.ensure_connected()?;
        let data = self
            .get(key)
            .map_err(|e| self.unavailable(e))?
            .ok_or_else(|| {
                Error::inconsistent(hash, format!("remote object for '{file_id}' is missing"))
            })?;
        compression.decompress(&data)
    }
}
