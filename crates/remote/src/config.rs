//! Configuration types for the remote tier

use buildstash_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote tier settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// Store address (`scheme://host[:port][/path]`)
    pub address: String,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-transfer timeout in milliseconds
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl RemoteConfig {
    /// Settings for `address` with default timeouts
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout_ms: default_connect_timeout_ms(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }

    /// The remote settings of a cache configuration, if a remote is set
    #[must_use]
    pub fn from_cache_config(config: &CacheConfig) -> Option<Self> {
        let address = config.remote.as_ref().filter(|a| !a.trim().is_empty())?;
        Some(Self {
            address: address.clone(),
            connect_timeout_ms: config.remote_connect_timeout_ms,
            transfer_timeout_ms: config.remote_transfer_timeout_ms,
            retry: RetryConfig::default(),
        })
    }

    /// Connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-transfer timeout
    #[must_use]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

/// Retry configuration with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

// Default value functions
fn default_connect_timeout_ms() -> u64 {
    100
}

fn default_transfer_timeout_ms() -> u64 {
    // Entries can be hundreds of MiB
    10_000
}

fn default_max_attempts() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RemoteConfig::new("file:///mnt/cache");
        assert_eq!(config.connect_timeout(), Duration::from_millis(100));
        assert_eq!(config.transfer_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_from_cache_config() {
        let mut cache = CacheConfig::with_root("/cache");
        assert!(RemoteConfig::from_cache_config(&cache).is_none());

        cache.remote = Some("file:///mnt/cache".into());
        cache.remote_connect_timeout_ms = 250;
        let config = RemoteConfig::from_cache_config(&cache).unwrap();
        assert_eq!(config.address, "file:///mnt/cache");
        assert_eq!(config.connect_timeout_ms, 250);
    }

    #[test]
    fn test_serde_defaults() {
        let config: RemoteConfig =
            serde_json::from_str(r#"{"address": "file:///mnt/cache"}"#).unwrap();
        assert_eq!(config, RemoteConfig::new("file:///mnt/cache"));
    }
}
