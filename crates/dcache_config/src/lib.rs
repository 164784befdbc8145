//! Parsing and validation of `dcache.toml` cache configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`CacheConfig`] describing where the cache lives, whether it may be written,
//! how large it may grow, and which staleness policy applies.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use types::*;
