//! Hit and miss statistics

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::path::Path;

/// Hit and miss counters for both tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served by the local tier
    #[serde(default)]
    pub local_hit_count: u64,
    /// Lookups the local tier could not serve
    #[serde(default)]
    pub local_miss_count: u64,
    /// Lookups served by the remote tier
    #[serde(default)]
    pub remote_hit_count: u64,
    /// Lookups the remote tier could not serve
    #[serde(default)]
    pub remote_miss_count: u64,
}

impl CacheStats {
    /// A single local hit
    #[must_use]
    pub fn local_hit() -> Self {
        Self {
            local_hit_count: 1,
            ..Self::default()
        }
    }

    /// A single local miss
    #[must_use]
    pub fn local_miss() -> Self {
        Self {
            local_miss_count: 1,
            ..Self::default()
        }
    }

    /// A single remote hit
    #[must_use]
    pub fn remote_hit() -> Self {
        Self {
            remote_hit_count: 1,
            ..Self::default()
        }
    }

    /// A single remote miss
    #[must_use]
    pub fn remote_miss() -> Self {
        Self {
            remote_miss_count: 1,
            ..Self::default()
        }
    }

    /// Lookups that neither tier could serve
    ///
    /// Every remote miss follows a local miss, so when a remote tier is in use
    /// the remote misses are the global misses.
    #[must_use]
    pub fn global_miss_count(&self) -> u64 {
        if self.remote_hit_count + self.remote_miss_count > 0 {
            self.remote_miss_count
        } else {
            self.local_miss_count
        }
    }

    /// Percentage of lookups served locally
    #[must_use]
    pub fn local_hit_ratio(&self) -> f64 {
        ratio(self.local_hit_count, self.local_miss_count)
    }

    /// Percentage of remote lookups that hit
    #[must_use]
    pub fn remote_hit_ratio(&self) -> f64 {
        ratio(self.remote_hit_count, self.remote_miss_count)
    }

    /// Percentage of lookups served by either tier
    #[must_use]
    pub fn global_hit_ratio(&self) -> f64 {
        ratio(
            self.local_hit_count + self.remote_hit_count,
            self.global_miss_count(),
        )
    }

    /// Read stats from a JSON file; a missing file is all zeros
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                Error::serialization(format!("Failed to parse stats {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io(e, path, "read")),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize stats: {e}")))
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        100.0 * hits as f64 / total as f64
    }
}

impl AddAssign for CacheStats {
    fn add_assign(&mut self, rhs: Self) {
        self.local_hit_count += rhs.local_hit_count;
        self.local_miss_count += rhs.local_miss_count;
        self.remote_hit_count += rhs.remote_hit_count;
        self.remote_miss_count += rhs.remote_miss_count;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Local hits:        {}", self.local_hit_count)?;
        writeln!(f, "  Local misses:      {}", self.local_miss_count)?;
        writeln!(f, "  Remote hits:       {}", self.remote_hit_count)?;
        writeln!(f, "  Remote misses:     {}", self.remote_miss_count)?;
        writeln!(f, "  Misses:            {}", self.global_miss_count())?;
        writeln!(f, "  Local hit ratio:   {:.1}%", self.local_hit_ratio())?;
        writeln!(f, "  Remote hit ratio:  {:.1}%", self.remote_hit_ratio())?;
        write!(f, "  Hit ratio:         {:.1}%", self.global_hit_ratio())
    }
}
