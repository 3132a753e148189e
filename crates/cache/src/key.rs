//! Validation for cache keys and file ids
//!
//! Hashes are opaque to the cache, but they end up as directory and object
//! names, so anything that could escape the storage root is rejected.

use crate::{Error, Result};

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validate a content hash, direct hash or remote object key
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key(key, "key is empty"));
    }
    if let Some(bad) = key.chars().find(|c| !is_key_char(*c)) {
        return Err(Error::invalid_key(key, format!("contains '{bad}'")));
    }
    Ok(())
}

/// Validate a file id used inside a cache entry
///
/// File ids become file names next to the entry record, so in addition to the
/// key characters they may contain `.` but must not start with one.
pub fn validate_file_id(file_id: &str) -> Result<()> {
    if file_id.is_empty() {
        return Err(Error::invalid_key(file_id, "file id is empty"));
    }
    if file_id.starts_with('.') {
        return Err(Error::invalid_key(file_id, "file id starts with '.'"));
    }
    if let Some(bad) = file_id.chars().find(|c| !is_key_char(*c) && *c != '.') {
        return Err(Error::invalid_key(file_id, format!("contains '{bad}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_hex_digests() {
        assert!(validate_key("9e8967a0708e7876df765864531bcd3f").is_ok());
        assert!(validate_key("h1").is_ok());
        assert!(validate_key("direct_hash-2").is_ok());
    }

    #[test]
    fn test_rejects_path_like_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("sha256:abc").is_err());
    }

    #[test]
    fn test_file_ids() {
        assert!(validate_file_id("obj").is_ok());
        assert!(validate_file_id("main.o").is_ok());
        assert!(validate_file_id(".entry").is_err());
        assert!(validate_file_id("..").is_err());
        assert!(validate_file_id("dir/file").is_err());
        assert!(validate_file_id("").is_err());
    }
}
