//! Cache configuration
//!
//! Settings come from built-in defaults, then `<root>/config.json`, then
//! `BUILDSTASH_*` environment variables. Only this module reads the
//! environment; the engine receives an explicit [`EngineConfig`].

use crate::engine::EngineConfig;
use crate::entry::Compression;
use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file inside the cache root
pub const CONFIG_FILE: &str = "config.json";

/// Effective cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the local cache
    pub root_dir: PathBuf,
    /// Remote tier address (`scheme://host[:port][/path]`)
    pub remote: Option<String>,
    /// Allow hard links between the cache and build outputs
    pub hard_links: bool,
    /// Store files zstd-compressed
    pub compress: bool,
    /// Copy remote hits into the local tier
    pub promote_remote_hits: bool,
    /// Never write to the remote tier
    pub remote_read_only: bool,
    /// Remote connect timeout in milliseconds
    pub remote_connect_timeout_ms: u64,
    /// Remote transfer timeout in milliseconds
    pub remote_transfer_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            remote: None,
            hard_links: false,
            compress: false,
            promote_remote_hits: true,
            remote_read_only: false,
            remote_connect_timeout_ms: 100,
            remote_transfer_timeout_ms: 10_000,
        }
    }
}

/// Environment snapshot used to resolve the configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    /// `BUILDSTASH_DIR`
    pub buildstash_dir: Option<PathBuf>,
    /// `XDG_CACHE_HOME`
    pub xdg_cache_home: Option<PathBuf>,
    /// Platform cache directory
    pub os_cache_dir: Option<PathBuf>,
    /// Home directory
    pub home_dir: Option<PathBuf>,
    /// Temporary directory
    pub temp_dir: PathBuf,
    /// `BUILDSTASH_REMOTE`
    pub remote: Option<String>,
    /// `BUILDSTASH_HARD_LINKS`
    pub hard_links: Option<String>,
    /// `BUILDSTASH_COMPRESS`
    pub compress: Option<String>,
    /// `BUILDSTASH_PROMOTE`
    pub promote: Option<String>,
    /// `BUILDSTASH_REMOTE_READ_ONLY`
    pub remote_read_only: Option<String>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl ConfigInputs {
    /// Read the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            buildstash_dir: env_value("BUILDSTASH_DIR").map(PathBuf::from),
            xdg_cache_home: env_value("XDG_CACHE_HOME").map(PathBuf::from),
            os_cache_dir: cache_dir(),
            home_dir: home_dir(),
            temp_dir: std::env::temp_dir(),
            remote: env_value("BUILDSTASH_REMOTE"),
            hard_links: env_value("BUILDSTASH_HARD_LINKS"),
            compress: env_value("BUILDSTASH_COMPRESS"),
            promote: env_value("BUILDSTASH_PROMOTE"),
            remote_read_only: env_value("BUILDSTASH_REMOTE_READ_ONLY"),
        }
    }
}

/// Parse a boolean setting (`1/0`, `true/false`, `yes/no`, `on/off`)
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_bool(target: &mut bool, value: Option<&String>, name: &str) -> Result<()> {
    if let Some(value) = value {
        *target = parse_bool(value).ok_or_else(|| {
            Error::configuration(format!("{name} must be a boolean, got '{value}'"))
        })?;
    }
    Ok(())
}

/// Created if missing, writable if present
fn usable_root(path: &Path) -> bool {
    if !path.exists() {
        return std::fs::create_dir_all(path).is_ok();
    }
    let writable = tempfile::tempfile_in(path).is_ok();
    if !writable {
        tracing::debug!(path = %path.display(), "Cache root candidate not writable");
    }
    writable
}

/// Pick the cache root from an environment snapshot
///
/// Candidates are tried in order: `BUILDSTASH_DIR`, `$XDG_CACHE_HOME`, the OS
/// cache directory, `~/.buildstash`, then the temp directory. The first
/// usable one wins.
pub fn cache_root_from_inputs(inputs: &ConfigInputs) -> Result<PathBuf> {
    let explicit = inputs
        .buildstash_dir
        .iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .cloned();
    let derived = [
        inputs.xdg_cache_home.as_ref().map(|dir| dir.join("buildstash")),
        inputs.os_cache_dir.as_ref().map(|dir| dir.join("buildstash")),
        inputs.home_dir.as_ref().map(|dir| dir.join(".buildstash")),
        Some(inputs.temp_dir.join("buildstash")),
    ];

    explicit
        .chain(derived.into_iter().flatten())
        .find(|candidate| usable_root(candidate))
        .ok_or_else(|| Error::configuration("No writable cache directory found"))
}

impl CacheConfig {
    /// Defaults with the given root
    #[must_use]
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve the configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_inputs(&ConfigInputs::from_env())
    }

    /// Resolve the configuration from an environment snapshot
    pub fn from_inputs(inputs: &ConfigInputs) -> Result<Self> {
        let root = cache_root_from_inputs(inputs)?;
        let mut config = Self::load_file(&root.join(CONFIG_FILE))?.unwrap_or_default();
        config.root_dir = root;

        if let Some(remote) = &inputs.remote {
            config.remote = Some(remote.clone());
        }
        apply_bool(
            &mut config.hard_links,
            inputs.hard_links.as_ref(),
            "BUILDSTASH_HARD_LINKS",
        )?;
        apply_bool(
            &mut config.compress,
            inputs.compress.as_ref(),
            "BUILDSTASH_COMPRESS",
        )?;
        apply_bool(
            &mut config.promote_remote_hits,
            inputs.promote.as_ref(),
            "BUILDSTASH_PROMOTE",
        )?;
        apply_bool(
            &mut config.remote_read_only,
            inputs.remote_read_only.as_ref(),
            "BUILDSTASH_REMOTE_READ_ONLY",
        )?;

        tracing::debug!(
            root = %config.root_dir.display(),
            remote = ?config.remote,
            "Resolved cache configuration"
        );
        Ok(config)
    }

    /// Read a configuration file; a missing file is `None`
    pub fn load_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).map(Some).map_err(|e| {
                Error::serialization(format!("Failed to parse config {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(e, path, "read")),
        }
    }

    /// At-rest compression for new entries
    #[must_use]
    pub fn compression(&self) -> Compression {
        if self.compress {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    /// Settings the engine needs
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            allow_hard_links: self.hard_links,
            promote_remote_hits: self.promote_remote_hits,
            remote_read_only: self.remote_read_only,
            compression: self.compression(),
        }
    }
}
