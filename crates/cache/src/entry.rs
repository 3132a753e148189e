//! Cache entries and the files a caller expects to get back from them

use crate::key::validate_file_id;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Current version of the persisted entry record format
///
/// Version 2 stores captured output as base64 so arbitrary bytes survive.
pub const ENTRY_FORMAT_VERSION: u32 = 2;

/// One output file the caller wants placed somewhere after a hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedFile {
    /// Where the file should end up
    pub path: PathBuf,
    /// The output is a directory tree rather than a single file
    #[serde(default)]
    pub is_directory: bool,
    /// A lookup is a miss if this file is absent from the entry
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl ExpectedFile {
    /// A required regular file at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            required: true,
        }
    }

    /// A required directory tree at `path`
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            required: true,
        }
    }

    /// Mark the file as optional (e.g. debug info a tool only sometimes writes)
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Expected files keyed by file id
pub type ExpectedFiles = BTreeMap<String, ExpectedFile>;

/// Where the bytes of a cached file live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredFile {
    /// Contents held in memory
    Inline(Vec<u8>),
    /// A file or directory on the local file system
    OnDisk(PathBuf),
    /// An object in a remote store, by object key
    Remote(String),
}

impl StoredFile {
    /// Short label for log output
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inline(_) => "inline",
            Self::OnDisk(_) => "on-disk",
            Self::Remote(_) => "remote",
        }
    }
}

/// At-rest compression of cached files
///
/// On an entry passed to `insert` this is the requested at-rest format (the
/// file contents handed over are always uncompressed). On an entry returned
/// from `find` it describes how the referenced data is actually stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Stored as-is
    #[default]
    None,
    /// Stored as a zstd frame
    Zstd,
}

/// zstd level used for at-rest compression
pub const ZSTD_LEVEL: i32 = 3;

impl Compression {
    /// Compress `data` according to this mode
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zstd => zstd::encode_all(data, ZSTD_LEVEL)
                .map_err(|e| Error::serialization(format!("zstd compression failed: {e}"))),
        }
    }

    /// Undo [`Compression::compress`]
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::serialization(format!("zstd decompression failed: {e}"))),
        }
    }
}

/// The record of one cache-worthy invocation: its output files and exit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Output files keyed by file id
    pub files: BTreeMap<String, StoredFile>,
    /// At-rest compression
    pub compression: Compression,
    /// Captured standard output of the invocation, byte for byte
    pub std_out: Vec<u8>,
    /// Captured standard error of the invocation, byte for byte
    pub std_err: Vec<u8>,
    /// Exit status of the invocation
    pub return_code: i32,
    /// Opaque attributes attached by the caller
    pub metadata: BTreeMap<String, String>,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry without files for an invocation that exited with `return_code`
    #[must_use]
    pub fn new(return_code: i32) -> Self {
        Self {
            files: BTreeMap::new(),
            compression: Compression::None,
            std_out: Vec::new(),
            std_err: Vec::new(),
            return_code,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// An entry referencing every expected output on disk
    ///
    /// Optional outputs the tool did not produce are left out; required ones
    /// are referenced even if missing so that storing fails loudly later.
    #[must_use]
    pub fn from_outputs(expected_files: &ExpectedFiles, return_code: i32) -> Self {
        let mut entry = Self::new(return_code);
        for (file_id, expected) in expected_files {
            if !expected.required && !expected.path.exists() {
                continue;
            }
            entry
                .files
                .insert(file_id.clone(), StoredFile::OnDisk(expected.path.clone()));
        }
        entry
    }

    /// Add a file
    #[must_use]
    pub fn with_file(mut self, file_id: impl Into<String>, file: StoredFile) -> Self {
        self.files.insert(file_id.into(), file);
        self
    }

    /// Attach captured program output
    #[must_use]
    pub fn with_output(mut self, std_out: impl Into<Vec<u8>>, std_err: impl Into<Vec<u8>>) -> Self {
        self.std_out = std_out.into();
        self.std_err = std_err.into();
        self
    }

    /// Attach a metadata attribute
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Request at-rest compression
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// The persisted form of this entry (file references are tier-specific and
    /// not part of the record)
    #[must_use]
    pub fn to_record(&self) -> EntryRecord {
        EntryRecord {
            format_version: ENTRY_FORMAT_VERSION,
            file_ids: self.files.keys().cloned().collect(),
            compression: self.compression,
            std_out: self.std_out.clone(),
            std_err: self.std_err.clone(),
            return_code: self.return_code,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }

    /// Check that every file id can be used as a storage name
    pub fn validate_file_ids(&self) -> Result<()> {
        self.files.keys().try_for_each(|id| validate_file_id(id))
    }

    /// The first file id that `expected_files` requires but this entry lacks
    #[must_use]
    pub fn missing_required<'a>(&self, expected_files: &'a ExpectedFiles) -> Option<&'a str> {
        expected_files
            .iter()
            .find(|(id, expected)| expected.required && !self.files.contains_key(*id))
            .map(|(id, _)| id.as_str())
    }
}

/// Serialized description of a stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Record format version
    pub format_version: u32,
    /// Ids of the files stored alongside the record
    pub file_ids: Vec<String>,
    /// At-rest compression of those files
    #[serde(default)]
    pub compression: Compression,
    /// Captured standard output
    #[serde(default, with = "base64_bytes")]
    pub std_out: Vec<u8>,
    /// Captured standard error
    #[serde(default, with = "base64_bytes")]
    pub std_err: Vec<u8>,
    /// Exit status
    pub return_code: i32,
    /// Caller attributes
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl EntryRecord {
    /// Parse a record, rejecting formats other than the current one
    pub fn from_json(data: &[u8], origin: &Path) -> Result<Self> {
        let record: Self = serde_json::from_slice(data).map_err(|e| {
            Error::serialization(format!(
                "Failed to parse entry record {}: {e}",
                origin.display()
            ))
        })?;
        if record.format_version != ENTRY_FORMAT_VERSION {
            return Err(Error::serialization(format!(
                "Unsupported entry format version {} in {}",
                record.format_version,
                origin.display()
            )));
        }
        Ok(record)
    }

    /// Serialize the record
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize entry record: {e}")))
    }

    /// Rebuild an entry, resolving each file id to a tier-specific reference
    pub fn into_entry(self, mut locate: impl FnMut(&str) -> StoredFile) -> CacheEntry {
        let files = self
            .file_ids
            .iter()
            .map(|id| (id.clone(), locate(id)))
            .collect();
        CacheEntry {
            files,
            compression: self.compression,
            std_out: self.std_out,
            std_err: self.std_err,
            return_code: self.return_code,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

/// Captured output is not guaranteed to be UTF-8
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expected_file_builders() {
        let f = ExpectedFile::new("/out/a.o");
        assert!(f.required);
        assert!(!f.is_directory);

        let d = ExpectedFile::directory("/out/gen").optional();
        assert!(d.is_directory);
        assert!(!d.required);
    }

    #[test]
    fn test_expected_file_serde_defaults() {
        let f: ExpectedFile = serde_json::from_str(r#"{"path":"/out/a.o"}"#).unwrap();
        assert!(f.required);
        assert!(!f.is_directory);
    }

    #[test]
    fn test_from_outputs_skips_absent_optional_files() {
        let temp = TempDir::new().unwrap();
        let obj = temp.path().join("a.o");
        std::fs::write(&obj, "X").unwrap();

        let mut expected = ExpectedFiles::new();
        expected.insert("obj".into(), ExpectedFile::new(&obj));
        expected.insert(
            "pdb".into(),
            ExpectedFile::new(temp.path().join("a.pdb")).optional(),
        );

        let entry = CacheEntry::from_outputs(&expected, 0);
        assert_eq!(entry.files.len(), 1);
        assert_eq!(entry.files["obj"], StoredFile::OnDisk(obj));
    }

    #[test]
    fn test_missing_required() {
        let mut expected = ExpectedFiles::new();
        expected.insert("obj".into(), ExpectedFile::new("/out/a.o"));
        expected.insert("dep".into(), ExpectedFile::new("/out/a.d").optional());

        let entry = CacheEntry::new(0).with_file("obj", StoredFile::Inline(b"X".to_vec()));
        assert_eq!(entry.missing_required(&expected), None);

        let empty = CacheEntry::new(0);
        assert_eq!(empty.missing_required(&expected), Some("obj"));
    }

    #[test]
    fn test_record_round_trip_keeps_output_and_status() {
        let entry = CacheEntry::new(2)
            .with_file("obj", StoredFile::Inline(b"X".to_vec()))
            .with_output("warning: unused", "error: nope")
            .with_metadata("tool", "cc")
            .with_compression(Compression::Zstd);

        let json = entry.to_record().to_json().unwrap();
        let record = EntryRecord::from_json(&json, Path::new(".entry")).unwrap();
        let rebuilt = record.into_entry(|id| StoredFile::Remote(format!("h/{id}")));

        assert_eq!(rebuilt.return_code, 2);
        assert_eq!(rebuilt.std_out, b"warning: unused");
        assert_eq!(rebuilt.std_err, b"error: nope");
        assert_eq!(rebuilt.compression, Compression::Zstd);
        assert_eq!(rebuilt.metadata["tool"], "cc");
        assert_eq!(rebuilt.files["obj"], StoredFile::Remote("h/obj".into()));
    }

    #[test]
    fn test_non_utf8_output_survives_record() {
        let std_out = b"caf\xe9 \x1b[1mbold\x1b[0m\n".to_vec();
        let std_err = vec![0xff, 0xfe, 0x00, b'x'];
        let entry = CacheEntry::new(0).with_output(std_out.clone(), std_err.clone());

        let json = entry.to_record().to_json().unwrap();
        assert!(std::str::from_utf8(&json).is_ok());
        let rebuilt = EntryRecord::from_json(&json, Path::new(".entry"))
            .unwrap()
            .into_entry(|id| StoredFile::Remote(id.to_string()));

        assert_eq!(rebuilt.std_out, std_out);
        assert_eq!(rebuilt.std_err, std_err);
    }

    #[test]
    fn test_other_record_formats_are_rejected() {
        for version in [ENTRY_FORMAT_VERSION - 1, ENTRY_FORMAT_VERSION + 1] {
            let mut record = CacheEntry::new(0).to_record();
            record.format_version = version;
            let json = serde_json::to_vec(&record).unwrap();
            assert!(EntryRecord::from_json(&json, Path::new(".entry")).is_err());
        }
    }

    #[test]
    fn test_zstd_compression_round_trip() {
        let data = b"int main() { return 0; }".repeat(64);
        let packed = Compression::Zstd.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(Compression::Zstd.decompress(&packed).unwrap(), data);
        assert_eq!(Compression::None.compress(&data).unwrap(), data);
    }

    #[test]
    fn test_invalid_file_ids_are_reported() {
        let entry = CacheEntry::new(0).with_file("../x", StoredFile::Inline(vec![]));
        assert!(entry.validate_file_ids().is_err());
    }
}
