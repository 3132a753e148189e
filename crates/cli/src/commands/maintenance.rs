//! Commands that inspect or reset the local cache

use crate::errors::{CliError, CliResult};
use buildstash_cache::{CacheConfig, LocalCache, LocalCacheSummary};
use std::fmt::Write as _;
use tracing::instrument;

/// Format a byte count with a binary unit
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KiB", "MiB", "GiB", "TiB"];
    let mut unit = 0;
    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} bytes")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// Render a cache summary as an aligned table
#[must_use]
pub fn format_summary(root: &std::path::Path, summary: &LocalCacheSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  Cache directory:   {}", root.display());
    let _ = writeln!(out, "  Entries in cache:  {}", summary.entry_count);
    let _ = writeln!(out, "  Cache size:        {}", format_size(summary.total_size));
    let _ = writeln!(out, "{}", summary.stats);
    out
}

#[instrument(skip_all)]
pub fn execute_stats(local: &LocalCache) -> CliResult<String> {
    let summary = local
        .summary()
        .map_err(|e| CliError::command_failed("stats", e))?;
    tracing::debug!(
        entries = summary.entry_count,
        size = summary.total_size,
        "Collected cache summary"
    );
    Ok(format_summary(local.root(), &summary))
}

#[instrument(skip_all)]
pub fn execute_zero_stats(local: &LocalCache) -> CliResult<String> {
    local
        .zero_stats()
        .map_err(|e| CliError::command_failed("zero-stats", e))?;
    Ok("Statistics zeroed".to_string())
}

#[instrument(skip_all)]
pub fn execute_clear(local: &LocalCache) -> CliResult<String> {
    let start = std::time::Instant::now();
    let removed = local
        .clear()
        .map_err(|e| CliError::command_failed("clear", e))?;
    Ok(format!(
        "Cleared {removed} entries in {} ms",
        start.elapsed().as_millis()
    ))
}

pub fn execute_config(config: &CacheConfig) -> CliResult<String> {
    serde_json::to_string_pretty(config).map_err(|e| {
        CliError::command_failed(
            "config",
            buildstash_cache::Error::serialization(e.to_string()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildstash_cache::{CacheEntry, CacheTier, StoredFile};
    use tempfile::TempDir;

    fn cache_with_entry(temp: &TempDir) -> LocalCache {
        let local = LocalCache::open(temp.path()).unwrap();
        let entry = CacheEntry::new(0).with_file("obj", StoredFile::Inline(b"0123456789".to_vec()));
        local.insert("abc123", &entry, false).unwrap();
        assert!(local.find("abc123").unwrap().is_some());
        assert!(local.find("def456").unwrap().is_none());
        local
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(1023), "1023 bytes");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_stats_table() {
        let temp = TempDir::new().unwrap();
        let local = cache_with_entry(&temp);

        let table = execute_stats(&local).unwrap();
        assert!(table.contains("Entries in cache:  1"));
        assert!(table.contains("Local hits:        1"));
        assert!(table.contains("Local misses:      1"));
        assert!(table.contains("Hit ratio:         50.0%"));
    }

    #[test]
    fn test_zero_stats_then_clear() {
        let temp = TempDir::new().unwrap();
        let local = cache_with_entry(&temp);

        execute_zero_stats(&local).unwrap();
        let summary = local.summary().unwrap();
        assert_eq!(summary.stats.local_hit_count, 0);
        assert_eq!(summary.entry_count, 1);

        let message = execute_clear(&local).unwrap();
        assert!(message.starts_with("Cleared 1 entries"));
        assert_eq!(local.summary().unwrap().entry_count, 0);
    }

    #[test]
    fn test_config_is_json() {
        let config = CacheConfig::with_root("/var/cache/buildstash");
        let json = execute_config(&config).unwrap();
        let parsed: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
