//! Error types for the remote tier

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from remote stores
#[derive(Error, Debug, Diagnostic)]
pub enum RemoteError {
    /// The store could not be reached
    #[error("Failed to connect to {endpoint}: {reason}")]
    #[diagnostic(
        code(buildstash::remote::connection_failed),
        help("Check that the remote cache is reachable; builds continue with the local cache")
    )]
    ConnectionFailed {
        /// Address or path of the store
        endpoint: String,
        /// What went wrong
        reason: String,
    },

    /// An operation exceeded its deadline
    #[error("Remote {operation} timed out after {timeout_ms} ms")]
    #[diagnostic(code(buildstash::remote::timeout))]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// I/O failure talking to the store
    #[error("Remote I/O {operation} failed: {}", path.display())]
    #[diagnostic(code(buildstash::remote::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path involved
        path: PathBuf,
        /// Operation that failed
        operation: String,
    },

    /// The remote address is malformed
    #[error("Invalid remote address '{address}': {reason}")]
    #[diagnostic(
        code(buildstash::remote::invalid_address),
        help("Use scheme://host[:port][/path], e.g. file:///mnt/buildstash")
    )]
    InvalidAddress {
        /// The rejected address
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// No store implementation exists for the address scheme
    #[error("Unsupported remote scheme '{scheme}'")]
    #[diagnostic(
        code(buildstash::remote::unsupported_scheme),
        help("Supported schemes: file")
    )]
    UnsupportedScheme {
        /// The scheme
        scheme: String,
    },

    /// Stored data could not be decoded
    #[error("Remote serialization error: {message}")]
    #[diagnostic(code(buildstash::remote::serialization))]
    Serialization {
        /// Description
        message: String,
    },

    /// All retry attempts failed
    #[error("Remote {operation} failed after {attempts} attempts: {last_error}")]
    #[diagnostic(code(buildstash::remote::retry_exhausted))]
    RetryExhausted {
        /// Operation that was retried
        operation: String,
        /// Number of attempts made
        attempts: usize,
        /// Message of the final error
        last_error: String,
    },
}

impl RemoteError {
    /// Create a connection error
    #[must_use]
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an I/O error
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: path.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid address error
    #[must_use]
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported scheme error
    #[must_use]
    pub fn unsupported_scheme(scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a retry exhausted error
    #[must_use]
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: usize,
        last_error: impl Into<String>,
    ) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Whether retrying the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // Transient transport conditions
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Io { .. } => true,

            // These errors are NOT retryable
            Self::InvalidAddress { .. }
            | Self::UnsupportedScheme { .. }
            | Self::Serialization { .. }
            | Self::RetryExhausted { .. } => false,
        }
    }

    /// Convert into the error the cache engine sees for a failing tier
    #[must_use]
    pub fn into_cache_error(self, tier: &str) -> buildstash_cache::Error {
        buildstash_cache::Error::unavailable(tier, self.to_string())
    }
}

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RemoteError::timeout("get", 100).is_retryable());
        assert!(RemoteError::connection_failed("file:///mnt", "gone").is_retryable());
        assert!(RemoteError::io(std::io::Error::other("x"), "/mnt/a", "read").is_retryable());
        assert!(!RemoteError::unsupported_scheme("redis").is_retryable());
        assert!(!RemoteError::serialization("bad json").is_retryable());
        assert!(!RemoteError::retry_exhausted("get", 3, "x").is_retryable());
    }

    #[test]
    fn test_into_cache_error_is_unavailable() {
        let err = RemoteError::timeout("get", 10_000).into_cache_error("fs");
        assert!(err.is_backend_unavailable());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_display() {
        let err = RemoteError::invalid_address("http//x", "missing '://'");
        assert_eq!(
            err.to_string(),
            "Invalid remote address 'http//x': missing '://'"
        );
    }
}
