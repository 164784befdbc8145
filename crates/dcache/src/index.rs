//! Cache index tracking every record file in a cache root.
//!
//! The index is stored as `index.json` in the cache root. It keeps a
//! metadata-only copy of each record keyed by on-disk file name, so the cache
//! can account for its total size and pick eviction victims without opening
//! record files.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use dcache_common::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::record::CacheRecord;

/// Name of the index file within the cache directory.
pub const INDEX_FILE: &str = "index.json";

/// Current index format version. Older or newer indexes are discarded.
const INDEX_FORMAT_VERSION: u32 = 1;

/// Metadata-only view of every record in a cache root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheIndex {
    /// Format version of the serialized index.
    format_version: u32,

    /// Record copies keyed by on-disk file name (including any collision
    /// suffix).
    records: BTreeMap<String, CacheRecord>,

    /// Sum of `record_size` over all records.
    #[serde(skip)]
    total_size: u64,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            format_version: INDEX_FORMAT_VERSION,
            records: BTreeMap::new(),
            total_size: 0,
        }
    }

    /// Returns the path of the index file for `cache_dir`.
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(INDEX_FILE)
    }

    /// Loads the index from the cache directory, returning `None` if the file
    /// doesn't exist, can't be parsed, or has a different format version.
    ///
    /// This is fail-safe: any error results in `None`, and the caller starts
    /// from an empty index.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(Self::path(cache_dir)).ok()?;
        let mut index = Self::from_json(&content).ok()?;
        if index.format_version != INDEX_FORMAT_VERSION {
            return None;
        }
        index.total_size = index.records.values().map(CacheRecord::record_size).sum();
        Some(index)
    }

    /// Parses an index from JSON.
    pub fn from_json(content: &str) -> Result<Self, CacheError> {
        serde_json::from_str(content).map_err(|e| CacheError::IndexParse {
            reason: e.to_string(),
        })
    }

    /// Saves the index to the cache directory.
    ///
    /// Creates the cache directory if it doesn't exist. The file is replaced
    /// atomically.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let path = Self::path(cache_dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(cache_dir).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;
        tmp.write_all(json.as_bytes()).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;
        tmp.persist(&path).map_err(|e| CacheError::Io {
            path,
            source: e.error,
        })?;
        Ok(())
    }

    /// Returns the record stored under `file_name`.
    pub fn get(&self, file_name: &str) -> Option<&CacheRecord> {
        self.records.get(file_name)
    }

    /// Finds the on-disk name of the record for `source` under `cache_filename`.
    pub fn find(&self, cache_filename: &str, source: &Path) -> Option<&str> {
        self.records
            .iter()
            .find(|(_, rec)| rec.cache_filename() == cache_filename && rec.source_pathname() == source)
            .map(|(name, _)| name.as_str())
    }

    /// Inserts or replaces the copy stored under `file_name`.
    ///
    /// Returns `true` if the stored copy changed in an equality-relevant way
    /// (or did not exist), meaning the on-disk index is out of date.
    pub fn upsert(&mut self, file_name: &str, record: &CacheRecord) -> bool {
        let previous = self.records.insert(file_name.to_string(), record.clone());
        if let Some(prev) = &previous {
            self.total_size -= prev.record_size();
        }
        self.total_size += record.record_size();
        previous.as_ref() != Some(record)
    }

    /// Refreshes the access time of the record stored under `file_name`.
    ///
    /// Returns `false` if there is no such record.
    pub fn touch(&mut self, file_name: &str, now: Timestamp) -> bool {
        match self.records.get_mut(file_name) {
            Some(rec) => {
                rec.touch(now);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the record stored under `file_name`.
    pub fn remove(&mut self, file_name: &str) -> Option<CacheRecord> {
        let removed = self.records.remove(file_name)?;
        self.total_size -= removed.record_size();
        Some(removed)
    }

    /// Returns the on-disk name of the least recently accessed record.
    pub fn oldest(&self) -> Option<&str> {
        self.records
            .iter()
            .min_by(|(a_name, a), (b_name, b)| {
                a.cmp_access_time(b).then_with(|| a_name.cmp(b_name))
            })
            .map(|(name, _)| name.as_str())
    }

    /// Returns `(file name, record)` pairs, least recently accessed first.
    pub fn by_access_time(&self) -> Vec<(&str, &CacheRecord)> {
        let mut entries: Vec<(&str, &CacheRecord)> = self
            .records
            .iter()
            .map(|(name, rec)| (name.as_str(), rec))
            .collect();
        entries.sort_by(|(a_name, a), (b_name, b)| {
            a.cmp_access_time(b).then_with(|| a_name.cmp(b_name))
        });
        entries
    }

    /// Iterates over `(file name, record)` pairs in file-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheRecord)> {
        self.records.iter().map(|(name, rec)| (name.as_str(), rec))
    }

    /// Returns the sum of all record sizes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
