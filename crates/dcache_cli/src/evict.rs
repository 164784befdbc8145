//! `dcache evict`: enforce the cache size bound.

use crate::session::open_cache;
use crate::{EvictArgs, GlobalArgs};

/// Runs the `dcache evict` command.
///
/// Uses `--max-kbytes` if given, otherwise the configured bound. A bound of
/// zero means unbounded and evicts nothing.
pub fn run(args: &EvictArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut cache = open_cache(global, false)?;
    let before = cache.total_size();

    let evicted = match args.max_kbytes {
        Some(0) => 0,
        Some(kbytes) => cache.evict_to(kbytes.saturating_mul(1024))?,
        None => cache.check_cache_size()?,
    };
    cache.flush_index()?;

    if !global.quiet {
        eprintln!(
            "  Evicted {evicted} records ({} -> {} bytes)",
            before,
            cache.total_size()
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use dcache::DerivedCache;

    #[test]
    fn evicts_down_to_bound() {
        let big = "x".repeat(800);
        let fx = Fixture::new(&[("a.egg", big.as_str()), ("b.egg", big.as_str())]);
        let args = EvictArgs {
            max_kbytes: Some(1),
        };
        assert_eq!(run(&args, &fx.global()).unwrap(), 0);

        let cache = DerivedCache::open_dir(&fx.cache_dir()).unwrap();
        assert_eq!(cache.record_count(), 1);
        assert_eq!(cache.total_size(), 800);
    }

    #[test]
    fn zero_bound_evicts_nothing() {
        let big = "x".repeat(800);
        let fx = Fixture::new(&[("a.egg", big.as_str())]);
        let args = EvictArgs {
            max_kbytes: Some(0),
        };
        assert_eq!(run(&args, &fx.global()).unwrap(), 0);
        let cache = DerivedCache::open_dir(&fx.cache_dir()).unwrap();
        assert_eq!(cache.record_count(), 1);
    }

    #[test]
    fn configured_bound_used_by_default() {
        let big = "x".repeat(800);
        let fx = Fixture::new(&[("a.egg", big.as_str())]);
        let args = EvictArgs { max_kbytes: None };
        assert_eq!(run(&args, &fx.global()).unwrap(), 0);
        let cache = DerivedCache::open_dir(&fx.cache_dir()).unwrap();
        assert_eq!(cache.record_count(), 1);
    }
}
