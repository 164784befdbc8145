//! Configuration types deserialized from `dcache.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The top-level configuration parsed from `dcache.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DcacheConfig {
    /// Settings for the on-disk derived-object cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Settings for one on-disk cache directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the index and all record files.
    pub root: PathBuf,
    /// When `false`, every lookup misses and nothing is stored.
    pub active: bool,
    /// When `true`, lookups work but nothing is written.
    pub read_only: bool,
    /// Upper bound on the total size of record files, in kilobytes. Zero
    /// disables the bound.
    pub max_size_kbytes: u64,
    /// Minimum number of seconds between index flushes triggered by normal
    /// traffic.
    pub flush_interval_secs: u64,
    /// How dependency files are compared against their recorded state.
    pub staleness: StalenessPolicy,
    /// Per payload-kind switches. Kinds not listed are cached.
    pub kinds: BTreeMap<String, bool>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".dcache"),
            active: true,
            read_only: false,
            max_size_kbytes: 1024 * 1024,
            flush_interval_secs: 30,
            staleness: StalenessPolicy::default(),
            kinds: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Creates the default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Returns the size bound in bytes, or `None` when the cache is unbounded.
    pub fn max_size_bytes(&self) -> Option<u64> {
        (self.max_size_kbytes > 0).then(|| self.max_size_kbytes.saturating_mul(1024))
    }

    /// Returns `true` if payloads of the given kind may be cached.
    pub fn caches_kind(&self, kind: &str) -> bool {
        self.kinds.get(kind).copied().unwrap_or(true)
    }
}

/// Policy for deciding whether a dependency file has changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessPolicy {
    /// Only the modification time is compared.
    Timestamp,
    /// Modification time and size are compared.
    #[default]
    TimestampAndSize,
    /// Modification time and size are compared; a mismatch is forgiven when the
    /// recorded content hash still matches the file.
    ContentHash,
}

impl StalenessPolicy {
    /// Returns `true` if this policy compares file sizes.
    pub fn compares_size(self) -> bool {
        !matches!(self, StalenessPolicy::Timestamp)
    }
}
