//! Remote cache tier for buildstash
//!
//! This crate implements the optional second cache tier: a [`RemoteCache`]
//! that stores entries in a [`RemoteStore`] and reports every transport
//! failure to the engine as an unavailable backend.
//!
//! Only shared-directory stores (`file://`) are provided; other schemes are
//! parsed but rejected with [`RemoteError::UnsupportedScheme`].

pub mod address;
pub mod config;
pub mod error;
pub mod retry;
pub mod store;
pub mod tier;

pub use address::RemoteAddress;
pub use config::{RemoteConfig, RetryConfig};
pub use error::{RemoteError, Result};
pub use store::{FsRemoteStore, RemoteStore, open_store};
pub use tier::RemoteCache;

use buildstash_cache::{CacheConfig, CacheTier};
use std::sync::Arc;

/// Create the remote tier a cache configuration asks for
///
/// Returns `Ok(None)` when no remote is configured. A malformed address or an
/// unsupported scheme is a configuration error; an unreachable store is not,
/// since the tier only connects on first use.
pub fn create_remote_tier(
    config: &CacheConfig,
) -> buildstash_cache::Result<Option<Arc<dyn CacheTier>>> {
    let Some(remote_config) = RemoteConfig::from_cache_config(config) else {
        return Ok(None);
    };

    let address = RemoteAddress::parse(&remote_config.address)
        .map_err(|e| buildstash_cache::Error::configuration(e.to_string()))?;
    let store =
        open_store(&address).map_err(|e| buildstash_cache::Error::configuration(e.to_string()))?;

    tracing::debug!(address = %address, store = store.name(), "Remote cache configured");
    Ok(Some(Arc::new(RemoteCache::new(store, remote_config))))
}
