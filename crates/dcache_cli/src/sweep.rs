//! `dcache sweep`: delete orphaned record files.

use crate::session::open_cache;
use crate::GlobalArgs;

/// Runs the `dcache sweep` command.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = open_cache(global, false)?;
    let removed = cache.sweep()?;
    if !global.quiet {
        eprintln!("  Removed {removed} orphaned files");
    }
    Ok(0)
}
