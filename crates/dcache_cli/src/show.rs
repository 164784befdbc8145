//! `dcache show`: look up the record for one source file.

use dcache::{DerivedCache, LookupResult};

use crate::session::open_cache;
use crate::{GlobalArgs, ShowArgs};

/// Runs the `dcache show` command.
pub fn run(args: &ShowArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut cache = open_cache(global, true)?;
    for line in describe(&mut cache, args)? {
        println!("{line}");
    }
    Ok(0)
}

/// Looks up the record and describes the outcome.
fn describe(
    cache: &mut DerivedCache,
    args: &ShowArgs,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let name = DerivedCache::cache_filename_for(&args.source, &args.ext)?;
    let status = match cache.lookup(&args.source, &args.ext)? {
        LookupResult::Hit(record) => {
            let mut lines = vec![format!("fresh: {record}")];
            for (i, dep) in record.dependent_files().iter().enumerate() {
                lines.push(format!(
                    "  [{i}] {} (mtime {}, {} bytes)",
                    dep.pathname.display(),
                    dep.timestamp,
                    dep.size
                ));
            }
            return Ok(lines);
        }
        LookupResult::Stale(_) => "stale",
        LookupResult::Miss(_) => "missing",
    };
    let mut lines = vec![format!("{status}: {} ({name})", args.source.display())];
    if status == "stale" {
        // The lookup hands back a fresh record; the index still has the old one.
        if let Some(old) = cache
            .index()
            .find(&name, &args.source)
            .and_then(|file| cache.index().get(file))
        {
            if let Some(reason) = cache.staleness(old) {
                lines.push(format!("  reason: {reason}"));
            }
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    fn args(fx: &Fixture, name: &str) -> ShowArgs {
        ShowArgs {
            source: fx.source(name),
            ext: "bam".to_string(),
        }
    }

    #[test]
    fn fresh_record_is_described() {
        let fx = Fixture::new(&[("a.egg", "aaa")]);
        let mut cache = open_cache(&fx.global(), true).unwrap();
        let lines = describe(&mut cache, &args(&fx, "a.egg")).unwrap();
        assert!(lines[0].starts_with("fresh:"));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn removed_source_is_stale() {
        let fx = Fixture::new(&[("a.egg", "aaa")]);
        std::fs::remove_file(fx.source("a.egg")).unwrap();
        let mut cache = open_cache(&fx.global(), true).unwrap();
        let lines = describe(&mut cache, &args(&fx, "a.egg")).unwrap();
        assert!(lines[0].starts_with("stale:"));
        assert!(lines[1].starts_with("  reason:"));
        assert!(lines[1].ends_with("missing"));
    }

    #[test]
    fn unknown_source_is_missing() {
        let fx = Fixture::new(&[("a.egg", "aaa")]);
        let mut cache = open_cache(&fx.global(), true).unwrap();
        let lines = describe(&mut cache, &args(&fx, "other.egg")).unwrap();
        assert!(lines[0].starts_with("missing:"));
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn extension_with_separator_is_error() {
        let fx = Fixture::new(&[("a.egg", "aaa")]);
        let mut cache = open_cache(&fx.global(), true).unwrap();
        let mut bad = args(&fx, "a.egg");
        bad.ext = "../bam".to_string();
        let err = describe(&mut cache, &bad).unwrap_err();
        assert!(err.to_string().contains("invalid cache file extension"));
    }
}
