//! Storage tier contracts
//!
//! The engine only ever talks to tiers through these traits. A tier reports an
//! absent entry as `Ok(None)` and a failing backend as `Err`, so the engine can
//! log the difference while treating both as a miss.

use crate::direct::DirectMapping;
use crate::entry::{CacheEntry, Compression, ExpectedFiles, StoredFile};
use crate::materialize::{MaterializeOptions, materialize_entry};
use crate::stats::CacheStats;
use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// Which tier served a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    /// The local on-disk tier
    Local,
    /// The optional remote tier
    Remote,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// A store of cache entries keyed by content hash
///
/// Each call must appear atomic to the caller: it either fully succeeds or
/// reports absence/failure, never a partially written entry.
pub trait CacheTier: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Look up an entry
    fn find(&self, hash: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry. File contents handed over are uncompressed; the entry's
    /// compression mode is the requested at-rest format.
    fn insert(&self, hash: &str, entry: &CacheEntry, allow_hard_links: bool) -> Result<()>;

    /// Whether materializing from this tier may hard link stored files
    fn supports_hard_links(&self) -> bool {
        false
    }

    /// A path holding the uncompressed contents of a stored file, if one exists
    fn local_path(
        &self,
        _hash: &str,
        _file_id: &str,
        file: &StoredFile,
        compression: Compression,
    ) -> Option<PathBuf> {
        match (file, compression) {
            (StoredFile::OnDisk(path), Compression::None) => Some(path.clone()),
            _ => None,
        }
    }

    /// The uncompressed contents of a stored file
    fn read_file(
        &self,
        hash: &str,
        file_id: &str,
        file: &StoredFile,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        match file {
            StoredFile::Inline(data) => compression.decompress(data),
            StoredFile::OnDisk(path) => {
                let data = std::fs::read(path).map_err(|e| Error::io(e, path, "read"))?;
                compression.decompress(&data)
            }
            StoredFile::Remote(key) => Err(Error::inconsistent(
                hash,
                format!(
                    "tier '{}' cannot read remote object '{key}' for file '{file_id}'",
                    self.name()
                ),
            )),
        }
    }

    /// Place the expected files of an entry returned by [`CacheTier::find`]
    ///
    /// Tiers whose entries can be replaced concurrently override this to keep
    /// the entry stable until every file is in place.
    fn materialize(
        &self,
        hash: &str,
        entry: &CacheEntry,
        expected_files: &ExpectedFiles,
        options: MaterializeOptions,
    ) -> Result<Vec<String>> {
        materialize_entry(self, hash, entry, expected_files, options)
    }

    /// Add a statistics delta; tiers without persistent stats ignore it
    fn record_stats(&self, _hash: &str, _delta: &CacheStats) {}
}

/// A store of direct-mode mappings
///
/// A direct hash may map to several content hashes, one per state of its
/// implicit inputs seen recently.
pub trait DirectMappingStore: Send + Sync {
    /// Every mapping stored for a direct hash, most recently used first
    fn find_direct_mappings(&self, direct_hash: &str) -> Result<Vec<DirectMapping>>;

    /// The most recently used mapping that `accept` takes, marking it used
    fn resolve_direct_mapping(
        &self,
        direct_hash: &str,
        accept: &mut dyn FnMut(&DirectMapping) -> bool,
    ) -> Result<Option<DirectMapping>>;

    /// Store a mapping for a direct hash, evicting the least recently used
    /// one when all slots are taken
    fn insert_direct_mapping(&self, direct_hash: &str, mapping: &DirectMapping) -> Result<()>;
}

/// What the engine needs from the local tier
pub trait LocalTier: CacheTier + DirectMappingStore {}

impl<T: CacheTier + DirectMappingStore> LocalTier for T {}
