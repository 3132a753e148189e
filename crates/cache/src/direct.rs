//! Direct-mode mappings from a cheap hash to a content hash
//!
//! A direct hash is computed from file metadata and the command line, which is
//! only trustworthy as long as the implicit inputs discovered during the real
//! run (headers and the like) have not changed. The mapping records those
//! inputs; a [`MappingValidator`] decides whether a stored mapping can still be
//! trusted.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A stored direct hash -> content hash mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMapping {
    /// The authoritative content hash this direct hash resolves to
    pub content_hash: String,
    /// Files that influenced the validity of the direct hash, in discovery order
    pub implicit_input_files: Vec<PathBuf>,
    /// Fingerprints of the implicit inputs taken when the mapping was stored
    #[serde(default)]
    pub input_fingerprints: BTreeMap<PathBuf, String>,
    /// When the mapping was stored
    pub created_at: DateTime<Utc>,
}

impl DirectMapping {
    /// A mapping without fingerprints
    #[must_use]
    pub fn new(content_hash: impl Into<String>, implicit_input_files: Vec<PathBuf>) -> Self {
        Self {
            content_hash: content_hash.into(),
            implicit_input_files,
            input_fingerprints: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach fingerprints
    #[must_use]
    pub fn with_fingerprints(mut self, fingerprints: BTreeMap<PathBuf, String>) -> Self {
        self.input_fingerprints = fingerprints;
        self
    }

    /// Parse a stored mapping
    pub fn from_json(data: &[u8], origin: &Path) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| {
            Error::serialization(format!(
                "Failed to parse direct mapping {}: {e}",
                origin.display()
            ))
        })
    }

    /// Serialize the mapping
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize direct mapping: {e}")))
    }
}

/// Decides whether a direct mapping may be used for a hit
///
/// The engine calls [`fingerprint`](MappingValidator::fingerprint) when a
/// mapping is stored and [`validate`](MappingValidator::validate) before a
/// stored mapping is followed.
pub trait MappingValidator: Send + Sync {
    /// Fingerprint the implicit inputs at store time
    fn fingerprint(&self, implicit_input_files: &[PathBuf]) -> BTreeMap<PathBuf, String>;

    /// Whether `mapping` is still valid
    fn validate(&self, mapping: &DirectMapping) -> bool;
}

/// Accepts every mapping
///
/// Used when the caller revalidates implicit inputs itself before asking for
/// a direct lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustMappings;

impl MappingValidator for TrustMappings {
    fn fingerprint(&self, _implicit_input_files: &[PathBuf]) -> BTreeMap<PathBuf, String> {
        BTreeMap::new()
    }

    fn validate(&self, _mapping: &DirectMapping) -> bool {
        true
    }
}

/// Compares SHA-256 digests of the implicit inputs
///
/// A mapping is rejected when any implicit input is missing, unreadable, or
/// has different contents than when the mapping was stored, or when an input
/// has no recorded fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDigestValidator;

impl ContentDigestValidator {
    fn digest_file(path: &Path) -> Option<String> {
        let data = fs::read(path).ok()?;
        Some(hex::encode(Sha256::digest(&data)))
    }
}

impl MappingValidator for ContentDigestValidator {
    fn fingerprint(&self, implicit_input_files: &[PathBuf]) -> BTreeMap<PathBuf, String> {
        implicit_input_files
            .iter()
            .filter_map(|path| Self::digest_file(path).map(|d| (path.clone(), d)))
            .collect()
    }

    fn validate(&self, mapping: &DirectMapping) -> bool {
        for path in &mapping.implicit_input_files {
            let Some(expected) = mapping.input_fingerprints.get(path) else {
                tracing::debug!(path = %path.display(), "No fingerprint recorded for implicit input");
                return false;
            };
            match Self::digest_file(path) {
                Some(actual) if &actual == expected => {}
                _ => {
                    tracing::debug!(path = %path.display(), "Implicit input differs");
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mapping_json_round_trip() {
        let mapping = DirectMapping::new("content", vec![PathBuf::from("/inc/a.h")]);
        let json = mapping.to_json().unwrap();
        let parsed = DirectMapping::from_json(&json, Path::new(".direct")).unwrap();
        assert_eq!(parsed, mapping);
    }

    #[test]
    fn test_trust_mappings_accepts_everything() {
        let mapping = DirectMapping::new("content", vec![PathBuf::from("/does/not/exist.h")]);
        assert!(TrustMappings.validate(&mapping));
        assert!(TrustMappings.fingerprint(&mapping.implicit_input_files).is_empty());
    }

    #[test]
    fn test_content_digest_validator_detects_changes() {
        let temp = TempDir::new().unwrap();
        let header = temp.path().join("a.h");
        fs::write(&header, "#define A 1\n").unwrap();

        let inputs = vec![header.clone()];
        let fingerprints = ContentDigestValidator.fingerprint(&inputs);
        let mapping = DirectMapping::new("content", inputs).with_fingerprints(fingerprints);
        assert!(ContentDigestValidator.validate(&mapping));

        fs::write(&header, "#define A 2\n").unwrap();
        assert!(!ContentDigestValidator.validate(&mapping));
    }

    #[test]
    fn test_content_digest_validator_rejects_missing_inputs() {
        let temp = TempDir::new().unwrap();
        let header = temp.path().join("gone.h");
        fs::write(&header, "x").unwrap();
        let inputs = vec![header.clone()];
        let mapping = DirectMapping::new("content", inputs.clone())
            .with_fingerprints(ContentDigestValidator.fingerprint(&inputs));

        fs::remove_file(&header).unwrap();
        assert!(!ContentDigestValidator.validate(&mapping));
    }

    #[test]
    fn test_content_digest_validator_rejects_unfingerprinted_inputs() {
        let mapping = DirectMapping::new("content", vec![PathBuf::from("/inc/a.h")]);
        assert!(!ContentDigestValidator.validate(&mapping));
    }
}
