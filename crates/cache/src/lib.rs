//! Two-tier build artifact cache for buildstash
//!
//! This crate provides the caching core:
//! - A [`CacheEngine`] composing a local tier and an optional remote tier
//! - Direct-mode lookups that map a cheap hash to a content hash
//! - Materialization of cached outputs via hard links or copies
//! - The on-disk [`LocalCache`] tier with per-entry locking and statistics
//!
//! # Overview
//!
//! A caller fingerprints a compilation unit, asks the engine for a hit, and
//! on a miss runs the real tool and stores its outputs:
//!
//! ```no_run
//! use buildstash_cache::{CacheEngine, CacheEntry, ExpectedFile, ExpectedFiles, LocalCache};
//! use std::sync::Arc;
//!
//! let local = Arc::new(LocalCache::open("/tmp/buildstash")?);
//! let engine = CacheEngine::new(local, None, Default::default());
//!
//! let mut expected = ExpectedFiles::new();
//! expected.insert("obj".into(), ExpectedFile::new("out/a.o"));
//!
//! if engine.lookup("3f2a9c", &expected, false, true).is_none() {
//!     // run the compiler, then
//!     let entry = CacheEntry::from_outputs(&expected, 0);
//!     engine.add("3f2a9c", &entry, &expected, false);
//! }
//! # Ok::<(), buildstash_cache::Error>(())
//! ```
//!
//! # Failure policy
//!
//! Cache failures never fail a build. Engine operations log through
//! `tracing` and report a miss or silently skip a store.

pub mod config;
pub mod direct;
pub mod engine;
pub mod entry;
mod error;
pub mod key;
pub mod local;
pub mod lock;
pub mod materialize;
pub mod stats;
pub mod tier;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use config::{CacheConfig, ConfigInputs, cache_root_from_inputs, parse_bool};
pub use direct::{ContentDigestValidator, DirectMapping, MappingValidator, TrustMappings};
pub use engine::{CacheEngine, CacheHit, EngineConfig};
pub use entry::{
    CacheEntry, Compression, ENTRY_FORMAT_VERSION, EntryRecord, ExpectedFile, ExpectedFiles,
    StoredFile,
};
pub use key::{validate_file_id, validate_key};
pub use local::{LocalCache, LocalCacheSummary};
pub use materialize::{MaterializeOptions, materialize_entry};
pub use stats::CacheStats;
pub use tier::{CacheTier, DirectMappingStore, LocalTier, TierKind};
