//! Placing cached files at the paths a caller expects
//!
//! Also hosts the file system helpers the local tier uses to ingest files,
//! since both directions need the same race-tolerant primitives.

use crate::entry::{CacheEntry, ExpectedFiles};
use crate::tier::CacheTier;
use crate::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::SystemTime;

/// Per-call materialization switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Hard links may be used instead of copies
    pub allow_hard_links: bool,
    /// Parent directories of target paths are created if missing
    pub create_target_dirs: bool,
}

/// Create a directory and its parents, tolerating concurrent creation
pub fn ensure_dir(path: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(Error::io(e, path, "create_dir_all")),
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path).map_err(|e| Error::io(e, path, "remove_dir_all"))
        }
        Ok(_) => fs::remove_file(path).map_err(|e| Error::io(e, path, "remove_file")),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(e, path, "symlink_metadata")),
    }
}

fn parent_of(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Write `data` to `target` through a temporary file and a rename
pub fn write_atomic(data: &[u8], target: &Path) -> Result<()> {
    let dir = parent_of(target);
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir, "create temp file"))?;
    tmp.write_all(data)
        .map_err(|e| Error::io(e, tmp.path(), "write"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(e, tmp.path(), "sync_all"))?;
    tmp.persist(target)
        .map_err(|e| Error::io(e.error, target, "rename"))?;
    Ok(())
}

/// Copy a regular file so that `target` never appears half written
pub fn copy_file(source: &Path, target: &Path) -> Result<()> {
    let dir = parent_of(target);
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io(e, dir, "create temp file"))?;
    fs::copy(source, tmp.path()).map_err(|e| Error::io(e, source, "copy"))?;
    tmp.persist(target)
        .map_err(|e| Error::io(e.error, target, "rename"))?;
    Ok(())
}

/// Hard link `source` to `target`, falling back to a copy
///
/// A linked target shares its inode with the cached original, so callers must
/// not modify it in place.
pub fn link_or_copy(source: &Path, target: &Path) -> Result<()> {
    remove_existing(target)?;
    match fs::hard_link(source, target) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(
                source = %source.display(),
                target = %target.display(),
                error = %e,
                "Hard link failed, copying instead"
            );
            copy_file(source, target)
        }
    }
}

/// Recursively copy a directory tree, replacing whatever is at `target`
pub fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    remove_existing(target)?;
    ensure_dir(target)?;
    for entry in walkdir::WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            Error::io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                path,
                "walk",
            )
        })?;
        let rel = entry.path().strip_prefix(source).map_err(|_| {
            Error::configuration(format!(
                "path {} is not under {}",
                entry.path().display(),
                source.display()
            ))
        })?;
        let dst = target.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&dst)?;
        } else {
            fs::copy(entry.path(), &dst).map_err(|e| Error::io(e, &dst, "copy"))?;
        }
    }
    Ok(())
}

/// Set the modification time of `path` to now
///
/// Build systems that compare timestamps must see a freshly retrieved output
/// as new, even though its contents are old.
pub fn touch(path: &Path) -> Result<()> {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| Error::io(e, path, "open"))?;
    file.set_modified(SystemTime::now())
        .map_err(|e| Error::io(e, path, "set_modified"))
}

/// Place every expected file of `entry` at its target path
///
/// Returns the ids of the files that were materialized. A required file that
/// the entry lacks is an inconsistency; optional ones are skipped.
pub fn materialize_entry<T: CacheTier + ?Sized>(
    tier: &T,
    hash: &str,
    entry: &CacheEntry,
    expected_files: &ExpectedFiles,
    options: MaterializeOptions,
) -> Result<Vec<String>> {
    let mut materialized = Vec::with_capacity(expected_files.len());

    for (file_id, expected) in expected_files {
        let Some(stored) = entry.files.get(file_id) else {
            if expected.required {
                return Err(Error::inconsistent(
                    hash,
                    format!("file '{file_id}' is missing from the cache entry"),
                ));
            }
            tracing::debug!(hash = %hash, file_id = %file_id, "Optional file not cached, skipping");
            continue;
        };

        let target = expected.path.as_path();
        if options.create_target_dirs {
            ensure_dir(parent_of(target))?;
        }

        match tier.local_path(hash, file_id, stored, entry.compression) {
            Some(source) if expected.is_directory || source.is_dir() => {
                copy_tree(&source, target)?;
            }
            Some(source) if options.allow_hard_links && tier.supports_hard_links() => {
                link_or_copy(&source, target)?;
            }
            Some(source) => {
                copy_file(&source, target)?;
            }
            None => {
                let data = tier.read_file(hash, file_id, stored, entry.compression)?;
                write_atomic(&data, target)?;
            }
        }

        if !expected.is_directory {
            touch(target)?;
        }

        tracing::debug!(
            hash = %hash,
            file_id = %file_id,
            source = stored.kind(),
            target = %target.display(),
            "Materialized cached file"
        );
        materialized.push(file_id.clone());
    }

    Ok(materialized)
}
