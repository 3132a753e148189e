//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
///
/// None of these are fatal to a build: the engine logs them and degrades to a
/// miss or a dropped store. Tiers return them so the engine can tell an absent
/// entry (`Ok(None)`) apart from a failing backend.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(buildstash::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "hard_link")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(buildstash::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    #[diagnostic(
        code(buildstash::cache::not_found),
        help("The cache entry may have been removed or never existed")
    )]
    NotFound {
        /// The cache key that was not found
        key: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(buildstash::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// A hash or file id that cannot be used as a storage key
    #[error("Invalid cache key '{key}': {reason}")]
    #[diagnostic(
        code(buildstash::cache::invalid_key),
        help("Keys may only contain ASCII letters, digits, '-' and '_'")
    )]
    InvalidKey {
        /// The rejected key
        key: String,
        /// Why the key was rejected
        reason: String,
    },

    /// Stored state contradicts what a lookup expects
    #[error("Cache inconsistency for {hash}: {reason}")]
    #[diagnostic(code(buildstash::cache::inconsistent))]
    Inconsistent {
        /// The hash of the affected entry
        hash: String,
        /// Description of the inconsistency
        reason: String,
    },

    /// A tier cannot be reached right now
    #[error("Cache tier '{tier}' unavailable: {reason}")]
    #[diagnostic(
        code(buildstash::cache::unavailable),
        help("The build continues without this cache tier")
    )]
    Unavailable {
        /// Name of the unavailable tier
        tier: String,
        /// Why the tier is unavailable
        reason: String,
    },

    /// A cache entry lock could not be taken
    #[error("Failed to lock {}", path.display())]
    #[diagnostic(code(buildstash::cache::lock))]
    Lock {
        /// The lock file path
        path: Box<Path>,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a not found error
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an inconsistency error
    #[must_use]
    pub fn inconsistent(hash: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Inconsistent {
            hash: hash.into(),
            reason: reason.into(),
        }
    }

    /// Create a tier unavailable error
    #[must_use]
    pub fn unavailable(tier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            tier: tier.into(),
            reason: reason.into(),
        }
    }

    /// Create a lock error
    #[must_use]
    pub fn lock(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Lock {
            path: path.as_ref().into(),
            source,
        }
    }

    /// Returns true if the error means the backend could not be reached, as
    /// opposed to the backend answering with bad or missing data.
    #[must_use]
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if a lookup failing with this error should be reported
    /// as a miss. Holds for every variant.
    #[must_use]
    pub fn is_miss_like(&self) -> bool {
        match self {
            Self::Io { .. }
            | Self::Configuration { .. }
            | Self::NotFound { .. }
            | Self::Serialization { .. }
            | Self::InvalidKey { .. }
            | Self::Inconsistent { .. }
            | Self::Unavailable { .. }
            | Self::Lock { .. } => true,
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_with_path() {
        let err = Error::io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/cache/c/ab/cdef/.entry",
            "read",
        );
        let msg = err.to_string();
        assert!(msg.contains("I/O read failed"));
        assert!(msg.contains(".entry"));
    }

    #[test]
    fn test_io_error_display_without_path() {
        let err = Error::io_no_path(std::io::Error::other("boom"), "hard_link");
        assert_eq!(err.to_string(), "I/O hard_link failed");
    }

    #[test]
    fn test_invalid_key_display() {
        let err = Error::invalid_key("../etc", "contains '.'");
        let msg = err.to_string();
        assert!(msg.contains("../etc"));
        assert!(msg.contains("contains '.'"));
    }

    #[test]
    fn test_inconsistent_display() {
        let err = Error::inconsistent("abc123", "file 'obj' missing from entry");
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("obj"));
    }

    #[test]
    fn test_backend_unavailable_classification() {
        assert!(Error::unavailable("remote", "connection refused").is_backend_unavailable());
        assert!(!Error::not_found("abc").is_backend_unavailable());
        assert!(!Error::inconsistent("abc", "x").is_backend_unavailable());
    }

    #[test]
    fn test_every_error_is_miss_like() {
        assert!(Error::not_found("abc").is_miss_like());
        assert!(Error::inconsistent("abc", "x").is_miss_like());
        assert!(Error::unavailable("remote", "down").is_miss_like());
        assert!(Error::io_no_path(std::io::Error::other("x"), "copy").is_miss_like());
    }
}
