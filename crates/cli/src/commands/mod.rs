pub mod lookup;
pub mod maintenance;
pub mod store;

use crate::errors::{CliError, CliResult};
use buildstash_cache::{CacheConfig, CacheEngine, ConfigInputs, ContentDigestValidator, LocalCache};
use buildstash_remote::create_remote_tier;
use std::path::Path;
use std::sync::Arc;

/// Resolve the cache configuration, with `dir` taking precedence over
/// `BUILDSTASH_DIR`
pub fn load_config(dir: Option<&Path>) -> CliResult<CacheConfig> {
    let mut inputs = ConfigInputs::from_env();
    if let Some(dir) = dir {
        inputs.buildstash_dir = Some(dir.to_path_buf());
    }
    CacheConfig::from_inputs(&inputs).map_err(|e| CliError::command_failed("load config", e))
}

/// The tiers a command works with
#[derive(Debug)]
pub struct CacheContext {
    pub config: CacheConfig,
    pub local: Arc<LocalCache>,
    pub engine: CacheEngine,
}

impl CacheContext {
    /// Open the local tier and, if configured, the remote tier
    ///
    /// The remote tier connects lazily, so an unreachable remote does not
    /// fail here.
    pub fn open(config: CacheConfig) -> CliResult<Self> {
        let local = Arc::new(
            LocalCache::open(&config.root_dir)
                .map_err(|e| CliError::command_failed("open local cache", e))?,
        );
        let remote = create_remote_tier(&config)
            .map_err(|e| CliError::command_failed("open remote cache", e))?;
        let engine = CacheEngine::new(local.clone(), remote, config.engine_config())
            .with_validator(Arc::new(ContentDigestValidator));

        Ok(Self {
            config,
            local,
            engine,
        })
    }
}
