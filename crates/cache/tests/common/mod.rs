//! Test tiers shared by the integration tests

#![allow(dead_code)]

use buildstash_cache::{CacheEntry, CacheTier, Compression, Error, Result, StoredFile};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An in-memory tier standing in for a remote store
#[derive(Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, CacheEntry>>,
    finds: AtomicUsize,
    inserts: AtomicUsize,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find` calls served so far
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    /// Number of `insert` calls served so far
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.lock().unwrap().contains_key(hash)
    }

    /// Seed an entry with a single inline file
    pub fn seed(&self, hash: &str, file_id: &str, content: &[u8], return_code: i32) {
        let entry = CacheEntry::new(return_code).with_file(file_id, StoredFile::Inline(content.to_vec()));
        self.entries.lock().unwrap().insert(hash.to_string(), entry);
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn find(&self, hash: &str) -> Result<Option<CacheEntry>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().get(hash).cloned())
    }

    fn insert(&self, hash: &str, entry: &CacheEntry, _allow_hard_links: bool) -> Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let mut stored = entry.clone().with_compression(Compression::None);
        stored.files.clear();
        for (file_id, file) in &entry.files {
            let data = match file {
                StoredFile::Inline(data) => data.clone(),
                StoredFile::OnDisk(path) => read(path)?,
                StoredFile::Remote(key) => {
                    return Err(Error::configuration(format!("cannot store remote object {key}")));
                }
            };
            stored.files.insert(file_id.clone(), StoredFile::Inline(data));
        }
        self.entries.lock().unwrap().insert(hash.to_string(), stored);
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::io(e, path, "read"))
}

/// A tier whose backend is never reachable
#[derive(Default)]
pub struct FailingTier {
    calls: AtomicUsize,
}

impl FailingTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CacheTier for FailingTier {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn find(&self, _hash: &str) -> Result<Option<CacheEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::unavailable("failing", "connection refused"))
    }

    fn insert(&self, _hash: &str, _entry: &CacheEntry, _allow_hard_links: bool) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::unavailable("failing", "connection refused"))
    }
}
