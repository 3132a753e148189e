//! Local on-disk cache tier
//!
//! Layout under the cache root:
//!
//! ```text
//! c/<prefix>/stats.json         hit/miss counters for keys sharing <prefix>
//! c/<prefix>/<rest>/.entry      entry record, written last
//! c/<prefix>/<rest>/<n>.direct  direct-mode mapping slots, n in 1..=4
//! c/<prefix>/<rest>/<file id>   stored output (zstd frame when compressed)
//! c/<prefix>/<rest>.lock        reader/writer lock for the entry
//! ```
//!
//! `<prefix>` is the first two characters of the key, or `_` for keys that
//! are too short to split.

use crate::direct::DirectMapping;
use crate::entry::{CacheEntry, Compression, EntryRecord, ExpectedFiles, StoredFile};
use crate::key::validate_key;
use crate::lock::{FileLock, lock_path_for};
use crate::materialize::{
    MaterializeOptions, copy_file, copy_tree, ensure_dir, link_or_copy, materialize_entry, touch,
    write_atomic,
};
use crate::stats::CacheStats;
use crate::tier::{CacheTier, DirectMappingStore};
use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const ENTRIES_DIR: &str = "c";
const ENTRY_FILE: &str = ".entry";
const DIRECT_SUFFIX: &str = ".direct";
/// Mappings kept per direct hash; all are tried on lookup
pub const MAX_DIRECT_MAPPINGS: usize = 4;
const STATS_FILE: &str = "stats.json";
const SHORT_KEY_PREFIX: &str = "_";

/// Totals reported by [`LocalCache::summary`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalCacheSummary {
    /// Summed hit/miss counters
    pub stats: CacheStats,
    /// Number of stored entries
    pub entry_count: u64,
    /// Bytes used by stored entries
    pub total_size: u64,
}

/// The local cache tier
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

fn split_key(key: &str) -> (&str, &str) {
    match (key.get(..2), key.get(2..)) {
        (Some(prefix), Some(rest)) if !rest.is_empty() => (prefix, rest),
        _ => (SHORT_KEY_PREFIX, key),
    }
}

fn direct_slot_path(dir: &Path, slot: usize) -> PathBuf {
    dir.join(format!("{slot}{DIRECT_SUFFIX}"))
}

/// One occupied direct mapping slot
struct DirectSlot {
    path: PathBuf,
    last_used: SystemTime,
    mapping: DirectMapping,
}

impl LocalCache {
    /// A cache rooted at `root`; nothing is created until the first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A cache rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self::new(root);
        ensure_dir(&cache.entries_dir())?;
        Ok(cache)
    }

    /// The cache root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_DIR)
    }

    /// Directory holding everything stored under `key`
    pub fn entry_dir(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let (prefix, rest) = split_key(key);
        Ok(self.entries_dir().join(prefix).join(rest))
    }

    fn stats_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let (prefix, _) = split_key(key);
        Ok(self.entries_dir().join(prefix).join(STATS_FILE))
    }

    fn prefix_dirs(&self) -> Result<Vec<PathBuf>> {
        let dir = self.entries_dir();
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &dir, "read_dir")),
        };
        let mut dirs = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| Error::io(e, &dir, "read_dir"))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn entry_dirs_in(prefix_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(prefix_dir).map_err(|e| Error::io(e, prefix_dir, "read_dir"))? {
            let entry = entry.map_err(|e| Error::io(e, prefix_dir, "read_dir"))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    fn clear_entry_dir(dir: &Path) -> Result<()> {
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(e, dir, "read_dir")),
        };
        for child in read {
            let child = child.map_err(|e| Error::io(e, dir, "read_dir"))?;
            let path = child.path();
            if child.file_name().to_string_lossy().ends_with(DIRECT_SUFFIX) {
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| Error::io(e, &path, "remove_dir_all"))?;
            } else {
                fs::remove_file(&path).map_err(|e| Error::io(e, &path, "remove_file"))?;
            }
        }
        Ok(())
    }

    fn store_file(
        target: &Path,
        file: &StoredFile,
        compression: Compression,
        allow_hard_links: bool,
    ) -> Result<()> {
        match file {
            StoredFile::Inline(data) => write_atomic(&compression.compress(data)?, target),
            StoredFile::OnDisk(source) if source.is_dir() => copy_tree(source, target),
            StoredFile::OnDisk(source) => match compression {
                Compression::None if allow_hard_links => link_or_copy(source, target),
                Compression::None => copy_file(source, target),
                Compression::Zstd => {
                    let data = fs::read(source).map_err(|e| Error::io(e, source, "read"))?;
                    write_atomic(&compression.compress(&data)?, target)
                }
            },
            StoredFile::Remote(key) => Err(Error::configuration(format!(
                "remote object '{key}' must be fetched before it can be stored locally"
            ))),
        }
    }

    /// Hit/miss counters summed over all prefixes, plus entry count and size
    pub fn summary(&self) -> Result<LocalCacheSummary> {
        let mut summary = LocalCacheSummary::default();
        for prefix_dir in self.prefix_dirs()? {
            summary.stats += CacheStats::load(&prefix_dir.join(STATS_FILE))?;
            for dir in Self::entry_dirs_in(&prefix_dir)? {
                if !dir.join(ENTRY_FILE).is_file() {
                    continue;
                }
                summary.entry_count += 1;
                for file in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                    if file.file_type().is_file() {
                        summary.total_size += file.metadata().map_or(0, |m| m.len());
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Reset all hit/miss counters
    pub fn zero_stats(&self) -> Result<()> {
        for prefix_dir in self.prefix_dirs()? {
            let path = prefix_dir.join(STATS_FILE);
            let _lock = FileLock::exclusive(lock_path_for(&path))?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(e, &path, "remove_file")),
            }
        }
        tracing::info!(root = %self.root.display(), "Cache statistics zeroed");
        Ok(())
    }

    /// Remove every stored entry and direct mapping; returns the number of
    /// entries removed. Statistics are kept.
    pub fn clear(&self) -> Result<u64> {
        let mut removed = 0;
        for prefix_dir in self.prefix_dirs()? {
            for dir in Self::entry_dirs_in(&prefix_dir)? {
                let lock_path = lock_path_for(&dir);
                let lock = FileLock::exclusive(&lock_path)?;
                if dir.join(ENTRY_FILE).is_file() {
                    removed += 1;
                }
                fs::remove_dir_all(&dir).map_err(|e| Error::io(e, &dir, "remove_dir_all"))?;
                drop(lock);
                let _ = fs::remove_file(&lock_path);
            }
        }
        tracing::info!(root = %self.root.display(), removed, "Local cache cleared");
        Ok(removed)
    }

    fn update_stats(&self, hash: &str, delta: &CacheStats) -> Result<()> {
        let path = self.stats_path(hash)?;
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let _lock = FileLock::exclusive(lock_path_for(&path))?;
        let mut stats = CacheStats::load(&path)?;
        stats += *delta;
        write_atomic(&stats.to_json()?, &path)
    }
}

impl CacheTier for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    fn find(&self, hash: &str) -> Result<Option<CacheEntry>> {
        let dir = self.entry_dir(hash)?;
        let result = self.read_entry(hash, &dir);
        match &result {
            Ok(Some(_)) => self.record_stats(hash, &CacheStats::local_hit()),
            Ok(None) | Err(_) => self.record_stats(hash, &CacheStats::local_miss()),
        }
        result
    }

    fn insert(&self, hash: &str, entry: &CacheEntry, allow_hard_links: bool) -> Result<()> {
        let dir = self.entry_dir(hash)?;
        entry.validate_file_ids()?;
        if let Some(parent) = dir.parent() {
            ensure_dir(parent)?;
        }

        let _lock = FileLock::exclusive(lock_path_for(&dir))?;
        Self::clear_entry_dir(&dir)?;
        ensure_dir(&dir)?;

        for (file_id, file) in &entry.files {
            Self::store_file(&dir.join(file_id), file, entry.compression, allow_hard_links)?;
        }

        let record = entry.to_record();
        write_atomic(&record.to_json()?, &dir.join(ENTRY_FILE))?;

        tracing::debug!(
            hash = %hash,
            files = entry.files.len(),
            compression = ?entry.compression,
            "Stored entry in local cache"
        );
        Ok(())
    }

    fn supports_hard_links(&self) -> bool {
        true
    }

    fn local_path(
        &self,
        _hash: &str,
        _file_id: &str,
        file: &StoredFile,
        compression: Compression,
    ) -> Option<PathBuf> {
        match file {
            // Directory outputs are always stored uncompressed
            StoredFile::OnDisk(path) if compression == Compression::None || path.is_dir() => {
                Some(path.clone())
            }
            _ => None,
        }
    }

    fn materialize(
        &self,
        hash: &str,
        entry: &CacheEntry,
        expected_files: &ExpectedFiles,
        options: MaterializeOptions,
    ) -> Result<Vec<String>> {
        let dir = self.entry_dir(hash)?;
        let _lock = FileLock::shared(lock_path_for(&dir))?;

        // The entry may have been replaced between find and now
        let entry_path = dir.join(ENTRY_FILE);
        let current = match fs::read(&entry_path) {
            Ok(data) => EntryRecord::from_json(&data, &entry_path)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::inconsistent(
                    hash,
                    "entry was removed before materializing",
                ));
            }
            Err(e) => return Err(Error::io(e, &entry_path, "read")),
        };
        if current != entry.to_record() {
            return Err(Error::inconsistent(hash, "entry was replaced before materializing"));
        }

        materialize_entry(self, hash, entry, expected_files, options)
    }

    fn record_stats(&self, hash: &str, delta: &CacheStats) {
        if validate_key(hash).is_err() {
            tracing::debug!(hash = %hash, "Not recording statistics for an invalid key");
            return;
        }
        if let Err(e) = self.update_stats(hash, delta) {
            tracing::warn!(hash = %hash, error = %e, "Failed to update cache statistics");
        }
    }
}

impl LocalCache {
    fn read_entry(&self, hash: &str, dir: &Path) -> Result<Option<CacheEntry>> {
        let Some(prefix_dir) = dir.parent() else {
            return Ok(None);
        };
        if !prefix_dir.is_dir() {
            return Ok(None);
        }

        let _lock = FileLock::shared(lock_path_for(dir))?;
        let entry_path = dir.join(ENTRY_FILE);
        let data = match fs::read(&entry_path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, &entry_path, "read")),
        };

        let record = EntryRecord::from_json(&data, &entry_path)?;
        let entry = record.into_entry(|id| StoredFile::OnDisk(dir.join(id)));
        for (file_id, file) in &entry.files {
            if let StoredFile::OnDisk(path) = file
                && !path.exists()
            {
                return Err(Error::inconsistent(
                    hash,
                    format!("stored file '{file_id}' is missing"),
                ));
            }
        }
        Ok(Some(entry))
    }
}

impl LocalCache {
    /// Occupied slots for `direct_hash`, most recently used first
    ///
    /// A slot that cannot be parsed is skipped.
    fn direct_slots(&self, direct_hash: &str) -> Result<Vec<DirectSlot>> {
        let dir = self.entry_dir(direct_hash)?;
        let mut slots = Vec::with_capacity(MAX_DIRECT_MAPPINGS);
        for slot in 1..=MAX_DIRECT_MAPPINGS {
            let path = direct_slot_path(&dir, slot);
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io(e, &path, "read")),
            };
            let mapping = match DirectMapping::from_json(&data, &path) {
                Ok(mapping) => mapping,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable direct mapping"
                    );
                    continue;
                }
            };
            let last_used = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(|e| Error::io(e, &path, "metadata"))?;
            slots.push(DirectSlot {
                path,
                last_used,
                mapping,
            });
        }
        // Stable, so equal times keep slot order
        slots.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(slots)
    }

    /// The first empty slot, otherwise the least recently used one
    fn slot_to_fill(dir: &Path) -> PathBuf {
        let mut oldest: Option<(SystemTime, PathBuf)> = None;
        for slot in 1..=MAX_DIRECT_MAPPINGS {
            let path = direct_slot_path(dir, slot);
            let Ok(last_used) = fs::metadata(&path).and_then(|m| m.modified()) else {
                return path;
            };
            if oldest.as_ref().is_none_or(|(time, _)| last_used < *time) {
                oldest = Some((last_used, path));
            }
        }
        oldest.map_or_else(|| direct_slot_path(dir, 1), |(_, path)| path)
    }
}

impl DirectMappingStore for LocalCache {
    fn find_direct_mappings(&self, direct_hash: &str) -> Result<Vec<DirectMapping>> {
        Ok(self
            .direct_slots(direct_hash)?
            .into_iter()
            .map(|slot| slot.mapping)
            .collect())
    }

    fn resolve_direct_mapping(
        &self,
        direct_hash: &str,
        accept: &mut dyn FnMut(&DirectMapping) -> bool,
    ) -> Result<Option<DirectMapping>> {
        for slot in self.direct_slots(direct_hash)? {
            if !accept(&slot.mapping) {
                continue;
            }
            if let Err(e) = touch(&slot.path) {
                tracing::debug!(
                    path = %slot.path.display(),
                    error = %e,
                    "Failed to mark direct mapping as used"
                );
            }
            return Ok(Some(slot.mapping));
        }
        Ok(None)
    }

    fn insert_direct_mapping(&self, direct_hash: &str, mapping: &DirectMapping) -> Result<()> {
        validate_key(&mapping.content_hash)?;
        let dir = self.entry_dir(direct_hash)?;
        ensure_dir(&dir)?;
        let path = Self::slot_to_fill(&dir);
        write_atomic(&mapping.to_json()?, &path)?;
        tracing::debug!(
            direct_hash = %direct_hash,
            content_hash = %mapping.content_hash,
            slot = %path.display(),
            "Stored direct mapping"
        );
        Ok(())
    }
}
