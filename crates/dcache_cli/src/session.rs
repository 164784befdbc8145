//! Shared setup for commands: resolving configuration and opening the cache.

use std::path::Path;

use dcache::DerivedCache;
use dcache_config::{load_config, load_config_file, CacheConfig};

use crate::GlobalArgs;

/// Resolves the cache configuration from the global flags.
///
/// An explicit `--config` file is used as-is, with a relative root resolved
/// against the file's directory. Otherwise `dcache.toml` is looked up in the
/// current directory. `--cache-dir` overrides the root in both cases.
pub fn resolve_config(global: &GlobalArgs) -> Result<CacheConfig, Box<dyn std::error::Error>> {
    let mut config = match &global.config {
        Some(path) => {
            let mut config = load_config_file(path)?.cache;
            if config.root.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                config.root = base.join(&config.root);
            }
            config
        }
        None => load_config(&std::env::current_dir()?)?.cache,
    };
    if let Some(dir) = &global.cache_dir {
        config.root = dir.clone();
    }
    Ok(config)
}

/// Opens the cache for a command.
///
/// Inspection commands pass `read_only` so nothing they do (including access
/// time updates from lookups) reaches disk.
pub fn open_cache(
    global: &GlobalArgs,
    read_only: bool,
) -> Result<DerivedCache, Box<dyn std::error::Error>> {
    let mut config = resolve_config(global)?;
    config.read_only |= read_only;
    // Maintenance works on whatever is on disk even if caching is switched off.
    config.active = true;
    if !config.root.is_dir() {
        return Err(format!("cache directory not found: {}", config.root.display()).into());
    }
    tracing::debug!(root = %config.root.display(), read_only = config.read_only, "opening cache");
    Ok(DerivedCache::open(config)?)
}
