use crate::cli::StoreArgs;
use crate::errors::{CliError, CliResult};
use buildstash_cache::{CacheEngine, CacheEntry};
use std::path::Path;
use tracing::instrument;

fn read_captured(path: Option<&Path>) -> CliResult<Vec<u8>> {
    path.map_or_else(
        || Ok(Vec::new()),
        |path| std::fs::read(path).map_err(|e| CliError::file_error("read", path, e)),
    )
}

/// Store a tool run's outputs, and its direct mapping if one is given
///
/// Storing is best effort: the engine logs tier failures instead of
/// reporting them.
#[instrument(skip_all, fields(hash = %args.hash))]
pub fn execute_store(engine: &CacheEngine, args: &StoreArgs) -> CliResult<()> {
    let expected_files = args
        .outputs
        .expected_files()
        .map_err(CliError::invalid_argument)?;
    let std_out = read_captured(args.stdout_file.as_deref())?;
    let std_err = read_captured(args.stderr_file.as_deref())?;

    let entry = CacheEntry::from_outputs(&expected_files, args.return_code)
        .with_output(std_out, std_err);
    engine.add(&args.hash, &entry, &expected_files, args.hard_links);

    if let Some(direct_hash) = &args.direct_hash {
        engine.add_direct(direct_hash, &args.hash, &args.implicit);
    }
    Ok(())
}
