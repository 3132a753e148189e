//! The cache engine
//!
//! Composes the local tier and an optional remote tier behind four calls:
//! [`CacheEngine::lookup`], [`CacheEngine::add`], [`CacheEngine::lookup_direct`]
//! and [`CacheEngine::add_direct`]. None of them report errors. Every failure
//! is logged and degrades to a miss or a dropped store.

use crate::direct::{DirectMapping, MappingValidator, TrustMappings};
use crate::entry::{CacheEntry, Compression, ExpectedFiles, StoredFile};
use crate::key::validate_key;
use crate::materialize::MaterializeOptions;
use crate::stats::CacheStats;
use crate::tier::{CacheTier, LocalTier, TierKind};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Engine-wide settings, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Hard links are permitted at all (combined with the per-call flag)
    pub allow_hard_links: bool,
    /// Remote hits are copied into the local tier
    pub promote_remote_hits: bool,
    /// Entries are never written to the remote tier
    pub remote_read_only: bool,
    /// At-rest compression for entries that do not request one
    pub compression: Compression,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_hard_links: false,
            promote_remote_hits: true,
            remote_read_only: false,
            compression: Compression::None,
        }
    }
}

/// A successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    /// Exit status recorded with the entry
    pub return_code: i32,
    /// Captured standard output to replay
    pub std_out: Vec<u8>,
    /// Captured standard error to replay
    pub std_err: Vec<u8>,
    /// Tier that served the entry
    pub tier: TierKind,
}

impl CacheHit {
    fn from_entry(entry: &CacheEntry, tier: TierKind) -> Self {
        Self {
            return_code: entry.return_code,
            std_out: entry.std_out.clone(),
            std_err: entry.std_err.clone(),
            tier,
        }
    }
}

/// Two-tier cache with direct-mode indirection
pub struct CacheEngine {
    local: Arc<dyn LocalTier>,
    remote: Option<Arc<dyn CacheTier>>,
    validator: Arc<dyn MappingValidator>,
    config: EngineConfig,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("local", &self.local.name())
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Create an engine over a local tier and an optional remote tier
    #[must_use]
    pub fn new(
        local: Arc<dyn LocalTier>,
        remote: Option<Arc<dyn CacheTier>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            local,
            remote,
            validator: Arc::new(TrustMappings),
            config,
        }
    }

    /// Use `validator` to fingerprint and revalidate direct mappings
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn MappingValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// The local tier
    #[must_use]
    pub fn local(&self) -> &Arc<dyn LocalTier> {
        &self.local
    }

    /// The remote tier, if configured
    #[must_use]
    pub fn remote(&self) -> Option<&Arc<dyn CacheTier>> {
        self.remote.as_ref()
    }

    /// Engine settings
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn options(&self, allow_hard_links: bool, create_target_dirs: bool) -> MaterializeOptions {
        MaterializeOptions {
            allow_hard_links: self.config.allow_hard_links && allow_hard_links,
            create_target_dirs,
        }
    }

    /// Look up `content_hash` and place its files at the expected paths
    ///
    /// The local tier is always consulted first. A remote hit is promoted
    /// into the local tier unless promotion is disabled. Returns `None` on a
    /// miss and on any failure.
    pub fn lookup(
        &self,
        content_hash: &str,
        expected_files: &ExpectedFiles,
        allow_hard_links: bool,
        create_target_dirs: bool,
    ) -> Option<CacheHit> {
        if let Err(e) = validate_key(content_hash) {
            tracing::warn!(
                hash = %content_hash,
                error = %e,
                "Invalid content hash, treating as miss"
            );
            return None;
        }
        let options = self.options(allow_hard_links, create_target_dirs);

        match self.local.find(content_hash) {
            Ok(Some(entry)) => {
                if let Some(file_id) = entry.missing_required(expected_files) {
                    tracing::warn!(
                        hash = %content_hash,
                        file_id = %file_id,
                        "Local entry lacks a required file, treating as local miss"
                    );
                } else {
                    return self.serve_local(content_hash, &entry, expected_files, options);
                }
            }
            Ok(None) => {
                tracing::debug!(hash = %content_hash, tier = "local", "Cache miss");
            }
            Err(e) => {
                tracing::warn!(
                    hash = %content_hash,
                    tier = "local",
                    error = %e,
                    "Local cache lookup failed, treating as miss"
                );
            }
        }

        let remote = self.remote.as_ref()?;
        self.lookup_remote(remote.as_ref(), content_hash, expected_files, options)
    }

    fn serve_local(
        &self,
        hash: &str,
        entry: &CacheEntry,
        expected_files: &ExpectedFiles,
        options: MaterializeOptions,
    ) -> Option<CacheHit> {
        match self.local.materialize(hash, entry, expected_files, options) {
            Ok(_) => {
                tracing::debug!(hash = %hash, tier = "local", "Cache hit");
                Some(CacheHit::from_entry(entry, TierKind::Local))
            }
            Err(e) => {
                tracing::warn!(
                    hash = %hash,
                    tier = "local",
                    error = %e,
                    "Failed to materialize cached files, treating as miss"
                );
                None
            }
        }
    }

    fn lookup_remote(
        &self,
        remote: &dyn CacheTier,
        hash: &str,
        expected_files: &ExpectedFiles,
        options: MaterializeOptions,
    ) -> Option<CacheHit> {
        let entry = match remote.find(hash) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(hash = %hash, tier = "remote", "Cache miss");
                self.local.record_stats(hash, &CacheStats::remote_miss());
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    hash = %hash,
                    tier = "remote",
                    unavailable = e.is_backend_unavailable(),
                    error = %e,
                    "Remote cache lookup failed, treating as miss"
                );
                self.local.record_stats(hash, &CacheStats::remote_miss());
                return None;
            }
        };

        if let Some(file_id) = entry.missing_required(expected_files) {
            tracing::warn!(
                hash = %hash,
                file_id = %file_id,
                "Remote entry lacks a required file, treating as miss"
            );
            self.local.record_stats(hash, &CacheStats::remote_miss());
            return None;
        }

        let materialized = match remote.materialize(hash, &entry, expected_files, options) {
            Ok(materialized) => materialized,
            Err(e) => {
                tracing::warn!(
                    hash = %hash,
                    tier = "remote",
                    error = %e,
                    "Failed to materialize cached files, treating as miss"
                );
                self.local.record_stats(hash, &CacheStats::remote_miss());
                return None;
            }
        };

        tracing::debug!(hash = %hash, tier = "remote", "Cache hit");
        self.local.record_stats(hash, &CacheStats::remote_hit());

        if self.config.promote_remote_hits {
            self.promote(remote, hash, &entry, expected_files, &materialized, options);
        }
        Some(CacheHit::from_entry(&entry, TierKind::Remote))
    }

    /// Copy a remote hit into the local tier
    ///
    /// Materialized files are taken from their targets; anything else the
    /// entry holds is fetched from the remote tier. Failure only logs.
    fn promote(
        &self,
        remote: &dyn CacheTier,
        hash: &str,
        entry: &CacheEntry,
        expected_files: &ExpectedFiles,
        materialized: &[String],
        options: MaterializeOptions,
    ) {
        let mut promoted = CacheEntry {
            files: BTreeMap::new(),
            compression: self.config.compression,
            std_out: entry.std_out.clone(),
            std_err: entry.std_err.clone(),
            return_code: entry.return_code,
            metadata: entry.metadata.clone(),
            created_at: entry.created_at,
        };

        for (file_id, stored) in &entry.files {
            let file = match expected_files.get(file_id) {
                Some(expected) if materialized.contains(file_id) => {
                    StoredFile::OnDisk(expected.path.clone())
                }
                _ => match remote.read_file(hash, file_id, stored, entry.compression) {
                    Ok(data) => StoredFile::Inline(data),
                    Err(e) => {
                        tracing::warn!(
                            hash = %hash,
                            file_id = %file_id,
                            error = %e,
                            "Failed to fetch file for promotion, skipping promotion"
                        );
                        return;
                    }
                },
            };
            promoted.files.insert(file_id.clone(), file);
        }

        match self.local.insert(hash, &promoted, options.allow_hard_links) {
            Ok(()) => tracing::debug!(hash = %hash, "Promoted remote hit to local cache"),
            Err(e) => tracing::warn!(
                hash = %hash,
                error = %e,
                "Failed to promote remote hit to local cache"
            ),
        }
    }

    /// Store `entry` under `content_hash` in every writable tier
    ///
    /// `expected_files` describes the lookup the entry must later satisfy; an
    /// entry missing a file it requires is not stored.
    pub fn add(
        &self,
        content_hash: &str,
        entry: &CacheEntry,
        expected_files: &ExpectedFiles,
        allow_hard_links: bool,
    ) {
        if let Err(e) = validate_key(content_hash) {
            tracing::warn!(hash = %content_hash, error = %e, "Invalid content hash, not storing");
            return;
        }
        if let Some(file_id) = entry.missing_required(expected_files) {
            tracing::warn!(
                hash = %content_hash,
                file_id = %file_id,
                "Entry lacks a required file, not storing"
            );
            return;
        }

        let entry = if entry.compression == Compression::None
            && self.config.compression != Compression::None
        {
            Cow::Owned(entry.clone().with_compression(self.config.compression))
        } else {
            Cow::Borrowed(entry)
        };
        let allow_hard_links = self.config.allow_hard_links && allow_hard_links;

        match self.local.insert(content_hash, &entry, allow_hard_links) {
            Ok(()) => tracing::debug!(hash = %content_hash, tier = "local", "Stored cache entry"),
            Err(e) => tracing::warn!(
                hash = %content_hash,
                tier = "local",
                error = %e,
                "Failed to store cache entry"
            ),
        }

        let Some(remote) = &self.remote else {
            return;
        };
        if self.config.remote_read_only {
            tracing::debug!(hash = %content_hash, "Remote cache is read-only, skipping store");
            return;
        }
        match remote.insert(content_hash, &entry, false) {
            Ok(()) => tracing::debug!(hash = %content_hash, tier = "remote", "Stored cache entry"),
            Err(e) => tracing::warn!(
                hash = %content_hash,
                tier = "remote",
                error = %e,
                "Failed to store cache entry"
            ),
        }
    }

    /// The stored mappings for `direct_hash`, most recently used first, so a
    /// caller can revalidate implicit inputs itself
    #[must_use]
    pub fn direct_mappings(&self, direct_hash: &str) -> Vec<DirectMapping> {
        match self.local.find_direct_mappings(direct_hash) {
            Ok(mappings) => mappings,
            Err(e) => {
                tracing::warn!(
                    direct_hash = %direct_hash,
                    error = %e,
                    "Failed to read direct mappings, treating as miss"
                );
                Vec::new()
            }
        }
    }

    /// Look up by direct hash
    ///
    /// Tries each mapping stored for `direct_hash`, most recently used first.
    /// A mapping is followed only if it passes revalidation, and then behaves
    /// like [`CacheEngine::lookup`] on its content hash. The first hit wins.
    pub fn lookup_direct(
        &self,
        direct_hash: &str,
        expected_files: &ExpectedFiles,
        allow_hard_links: bool,
        create_target_dirs: bool,
    ) -> Option<CacheHit> {
        let mut hit = None;
        let mut accept = |mapping: &DirectMapping| {
            if !self.validator.validate(mapping) {
                tracing::debug!(
                    direct_hash = %direct_hash,
                    content_hash = %mapping.content_hash,
                    "Direct mapping failed revalidation"
                );
                return false;
            }
            hit = self.lookup(
                &mapping.content_hash,
                expected_files,
                allow_hard_links,
                create_target_dirs,
            );
            if hit.is_none() {
                tracing::debug!(
                    direct_hash = %direct_hash,
                    content_hash = %mapping.content_hash,
                    "Direct mapping resolved but content entry unavailable"
                );
            }
            hit.is_some()
        };

        match self.local.resolve_direct_mapping(direct_hash, &mut accept) {
            Ok(Some(_)) => hit,
            Ok(None) => {
                tracing::debug!(direct_hash = %direct_hash, "No usable direct mapping");
                None
            }
            Err(e) => {
                tracing::warn!(
                    direct_hash = %direct_hash,
                    error = %e,
                    "Failed to read direct mappings, treating as miss"
                );
                None
            }
        }
    }

    /// Record that `direct_hash` maps to `content_hash`
    ///
    /// Written to the local tier only, since implicit input validity depends
    /// on this machine's file system.
    pub fn add_direct(
        &self,
        direct_hash: &str,
        content_hash: &str,
        implicit_input_files: &[PathBuf],
    ) {
        let fingerprints = self.validator.fingerprint(implicit_input_files);
        let mapping = DirectMapping::new(content_hash, implicit_input_files.to_vec())
            .with_fingerprints(fingerprints);

        match self.local.insert_direct_mapping(direct_hash, &mapping) {
            Ok(()) => tracing::debug!(
                direct_hash = %direct_hash,
                content_hash = %content_hash,
                implicit_inputs = implicit_input_files.len(),
                "Stored direct mapping"
            ),
            Err(e) => tracing::warn!(
                direct_hash = %direct_hash,
                error = %e,
                "Failed to store direct mapping"
            ),
        }
    }
}
