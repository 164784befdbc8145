//! `dcache verify`: report stale records.

use crate::session::open_cache;
use crate::GlobalArgs;

/// Runs the `dcache verify` command.
///
/// Opens the cache read-only and prints one line per stale record. Nothing on
/// disk is changed; stale records are replaced the next time their source is
/// converted.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = open_cache(global, true)?;
    let stale = cache.verify();

    for (name, reason) in &stale {
        println!("{name}: {reason}");
    }
    if !global.quiet {
        eprintln!(
            "  {} of {} records stale",
            stale.len(),
            cache.record_count()
        );
    }
    Ok(0)
}
