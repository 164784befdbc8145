//! `dcache list`: show cache records in eviction order.

use dcache::DerivedCache;
use serde_json::json;

use crate::session::open_cache;
use crate::{GlobalArgs, ListArgs};

/// Runs the `dcache list` command.
pub fn run(args: &ListArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = open_cache(global, true)?;

    if args.json {
        println!("{}", render_json(&cache)?);
        return Ok(0);
    }

    for line in render_text(&cache, global.verbose) {
        println!("{line}");
    }
    if !global.quiet {
        eprintln!(
            "  {} records, {} bytes",
            cache.record_count(),
            cache.total_size()
        );
    }
    Ok(0)
}

/// Renders one line per record, least recently accessed first.
///
/// With `verbose`, each record is followed by its dependencies.
fn render_text(cache: &DerivedCache, verbose: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, record) in cache.index().by_access_time() {
        lines.push(format!(
            "{name}  {:>10}  {}  {}",
            record.record_size(),
            record.record_access_time(),
            record.source_pathname().display()
        ));
        if verbose {
            for dep in record.dependent_files() {
                lines.push(format!(
                    "    {} (mtime {}, {} bytes)",
                    dep.pathname.display(),
                    dep.timestamp,
                    dep.size
                ));
            }
        }
    }
    lines
}

/// Renders all records as a JSON array, least recently accessed first.
fn render_json(cache: &DerivedCache) -> Result<String, serde_json::Error> {
    let records: Vec<serde_json::Value> = cache
        .index()
        .by_access_time()
        .into_iter()
        .map(|(name, record)| {
            json!({
                "file": name,
                "source": record.source_pathname(),
                "cache_filename": record.cache_filename(),
                "source_timestamp": record.source_timestamp().secs(),
                "recorded_time": record.recorded_time().secs(),
                "access_time": record.record_access_time().secs(),
                "size": record.record_size(),
                "dependencies": record.dependent_files(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::session::open_cache;

    #[test]
    fn text_lists_every_record() {
        let fx = Fixture::new(&[("a.egg", "aaa"), ("b.egg", "bbbbb")]);
        let cache = open_cache(&fx.global(), true).unwrap();

        let lines = render_text(&cache, false);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.contains("a.egg")));
        assert!(lines.iter().any(|l| l.contains("b.egg")));

        let verbose = render_text(&cache, true);
        assert_eq!(verbose.len(), 4);
    }

    #[test]
    fn json_is_array_of_records() {
        let fx = Fixture::new(&[("a.egg", "aaa")]);
        let cache = open_cache(&fx.global(), true).unwrap();

        let value: serde_json::Value = serde_json::from_str(&render_json(&cache).unwrap()).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["size"], 3);
        assert_eq!(
            records[0]["source"],
            fx.source("a.egg").to_str().unwrap()
        );
        assert_eq!(records[0]["dependencies"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn run_succeeds_on_empty_cache() {
        let fx = Fixture::new(&[]);
        assert_eq!(run(&ListArgs { json: false }, &fx.global()).unwrap(), 0);
        assert_eq!(run(&ListArgs { json: true }, &fx.global()).unwrap(), 0);
    }
}
