//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::DcacheConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "dcache.toml";

/// Loads and validates `dcache.toml` from a project directory.
///
/// A missing file is not an error: the defaults are returned, with the cache
/// root resolved relative to `project_dir`.
pub fn load_config(project_dir: &Path) -> Result<DcacheConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        let mut config = DcacheConfig::default();
        config.cache.root = project_dir.join(&config.cache.root);
        return Ok(config);
    }
    let mut config = load_config_file(&config_path)?;
    if config.cache.root.is_relative() {
        config.cache.root = project_dir.join(&config.cache.root);
    }
    Ok(config)
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<DcacheConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `dcache.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<DcacheConfig, ConfigError> {
    let config: DcacheConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are consistent.
fn validate_config(config: &DcacheConfig) -> Result<(), ConfigError> {
    if config.cache.root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.root must not be empty".to_string(),
        ));
    }
    Ok(())
}
