//! On-disk cache fixtures for command tests.

use std::path::PathBuf;

use dcache::{BlobPayload, DerivedCache, OsFileStat, PayloadHandle};
use tempfile::TempDir;

use crate::GlobalArgs;

/// A temporary project with source files and a populated cache.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Writes each `(name, content)` source file and stores a blob record for
    /// it under `cache/`.
    pub fn new(sources: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Self { dir };
        let mut cache = DerivedCache::open_dir(&fixture.cache_dir()).unwrap();
        for (name, content) in sources {
            let source = fixture.source(name);
            std::fs::write(&source, content).unwrap();
            let mut record = cache.lookup(&source, "bam").unwrap().into_record();
            record.add_dependent_path(&source, &OsFileStat, false);
            record
                .set_payload(PayloadHandle::owned(BlobPayload::new(content.as_bytes())))
                .unwrap();
            assert!(cache.store(&mut record).unwrap());
        }
        fixture
    }

    /// Returns the cache root.
    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Returns the path of source file `name`.
    pub fn source(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Returns global flags pointing at this fixture's cache.
    pub fn global(&self) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            cache_dir: Some(self.cache_dir()),
            config: None,
        }
    }
}
