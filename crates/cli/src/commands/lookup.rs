use crate::cli::LookupArgs;
use crate::errors::{CliError, CliResult};
use buildstash_cache::{CacheEngine, CacheHit};
use tracing::instrument;

/// Exit code reported for a cache miss
pub const MISS_EXIT_CODE: i32 = 1;

/// Run a lookup; `None` is a miss
#[instrument(skip_all, fields(hash = %args.hash, direct = args.direct))]
pub fn execute_lookup(engine: &CacheEngine, args: &LookupArgs) -> CliResult<Option<CacheHit>> {
    let expected_files = args
        .outputs
        .expected_files()
        .map_err(CliError::invalid_argument)?;
    let create_target_dirs = !args.no_create_dirs;

    let hit = if args.direct {
        engine.lookup_direct(
            &args.hash,
            &expected_files,
            args.hard_links,
            create_target_dirs,
        )
    } else {
        engine.lookup(
            &args.hash,
            &expected_files,
            args.hard_links,
            create_target_dirs,
        )
    };

    match &hit {
        Some(hit) => tracing::info!(tier = %hit.tier, return_code = hit.return_code, "Cache hit"),
        None => tracing::info!("Cache miss"),
    }
    Ok(hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{OutputArgs, parse_file_arg};
    use buildstash_cache::{
        CacheEntry, EngineConfig, ExpectedFiles, LocalCache, StoredFile, TierKind,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn args(hash: &str, file: &str) -> LookupArgs {
        LookupArgs {
            hash: hash.to_string(),
            outputs: OutputArgs {
                files: vec![parse_file_arg(file).unwrap()],
                ..OutputArgs::default()
            },
            direct: false,
            hard_links: false,
            no_create_dirs: false,
        }
    }

    #[test]
    fn test_lookup_hit_restores_file() {
        let temp = TempDir::new().unwrap();
        let local = Arc::new(LocalCache::open(temp.path().join("cache")).unwrap());
        let engine = CacheEngine::new(local, None, EngineConfig::default());
        let target = temp.path().join("out/main.o");

        engine.add(
            "abc123",
            &CacheEntry::new(3)
                .with_file("obj", StoredFile::Inline(b"OBJ".to_vec()))
                .with_output("compiled\n", ""),
            &ExpectedFiles::new(),
            false,
        );

        let lookup = args("abc123", &format!("obj={}", target.display()));
        let hit = execute_lookup(&engine, &lookup).unwrap().unwrap();
        assert_eq!(hit.return_code, 3);
        assert_eq!(hit.std_out, b"compiled\n");
        assert_eq!(hit.tier, TierKind::Local);
        assert_eq!(std::fs::read(&target).unwrap(), b"OBJ");
    }

    #[test]
    fn test_lookup_miss() {
        let temp = TempDir::new().unwrap();
        let local = Arc::new(LocalCache::open(temp.path()).unwrap());
        let engine = CacheEngine::new(local, None, EngineConfig::default());

        let lookup = args("abc123", "obj=main.o");
        assert!(execute_lookup(&engine, &lookup).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_ids_are_argument_errors() {
        let temp = TempDir::new().unwrap();
        let local = Arc::new(LocalCache::open(temp.path()).unwrap());
        let engine = CacheEngine::new(local, None, EngineConfig::default());

        let mut lookup = args("abc123", "obj=a.o");
        lookup.outputs.optional = vec![parse_file_arg("obj=b.o").unwrap()];
        assert!(matches!(
            execute_lookup(&engine, &lookup),
            Err(CliError::InvalidArgument { .. })
        ));
    }
}
