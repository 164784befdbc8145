//! A single cache entry: metadata, dependencies, and an optional payload.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use dcache_common::Timestamp;
use dcache_config::StalenessPolicy;
use serde::{Deserialize, Serialize};

use crate::dependency::{DependencyChange, DependentFile};
use crate::error::RecordError;
use crate::payload::{PayloadHandle, PayloadRef};
use crate::stat::FileStat;

/// One cache entry.
///
/// Holds everything needed to decide whether a previously derived object is
/// still valid for its source, plus at most one materialized copy of that
/// object. The record is not synchronized; the owning cache serializes access.
///
/// Cloning copies the metadata only. The clone never carries the payload, so
/// two records can never share one stateful in-memory object by accident.
///
/// Equality compares `source_pathname`, `cache_filename`, `recorded_time`,
/// and `record_size` only. The access time and the payload never take part.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheRecord {
    source_pathname: PathBuf,
    cache_filename: String,
    source_timestamp: Timestamp,
    recorded_time: Timestamp,
    record_access_time: Timestamp,
    record_size: u64,
    dependent_files: Vec<DependentFile>,
    #[serde(skip)]
    payload: Option<PayloadHandle>,
}

/// Why a record is considered stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The record tracks no dependency files.
    NoDependencies,
    /// The primary source's timestamp was never known.
    UnknownSourceTimestamp,
    /// A dependency changed.
    Dependency {
        /// Position of the dependency in the record.
        index: usize,
        /// The dependency's pathname.
        pathname: PathBuf,
        /// What changed.
        change: DependencyChange,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NoDependencies => f.write_str("no dependent files"),
            StaleReason::UnknownSourceTimestamp => f.write_str("source timestamp unknown"),
            StaleReason::Dependency {
                pathname, change, ..
            } => write!(f, "{}: {change}", pathname.display()),
        }
    }
}

impl CacheRecord {
    /// Creates an empty record for a cache miss.
    pub fn new(source_pathname: impl Into<PathBuf>, cache_filename: impl Into<String>) -> Self {
        Self {
            source_pathname: source_pathname.into(),
            cache_filename: cache_filename.into(),
            source_timestamp: Timestamp::UNKNOWN,
            recorded_time: Timestamp::UNKNOWN,
            record_access_time: Timestamp::UNKNOWN,
            record_size: 0,
            dependent_files: Vec::new(),
            payload: None,
        }
    }

    /// Identity of the primary source input.
    pub fn source_pathname(&self) -> &Path {
        &self.source_pathname
    }

    /// Hash-based name of the record, relative to the cache root.
    pub fn cache_filename(&self) -> &str {
        &self.cache_filename
    }

    /// Modification time of the primary source when the record was built.
    pub fn source_timestamp(&self) -> Timestamp {
        self.source_timestamp
    }

    /// Overrides the primary source timestamp.
    pub fn set_source_timestamp(&mut self, timestamp: Timestamp) {
        self.source_timestamp = timestamp;
    }

    /// Wall-clock time the record was last written.
    pub fn recorded_time(&self) -> Timestamp {
        self.recorded_time
    }

    /// Wall-clock time of the last read access.
    pub fn record_access_time(&self) -> Timestamp {
        self.record_access_time
    }

    /// Size in bytes of the persisted payload.
    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    /// Refreshes the access time. Does not affect equality.
    pub fn touch(&mut self, now: Timestamp) {
        self.record_access_time = now;
    }

    /// Notes that the record was just written with a payload of `size` bytes.
    pub fn mark_recorded(&mut self, now: Timestamp, size: u64) {
        self.recorded_time = now;
        self.record_size = size;
    }

    // -- dependencies --

    /// Number of tracked dependency files.
    pub fn dependent_file_count(&self) -> usize {
        self.dependent_files.len()
    }

    /// Pathname of the dependency at `index`.
    pub fn dependent_pathname(&self, index: usize) -> Result<&Path, RecordError> {
        self.dependent_file(index).map(|dep| dep.pathname.as_path())
    }

    /// The dependency at `index`.
    pub fn dependent_file(&self, index: usize) -> Result<&DependentFile, RecordError> {
        self.dependent_files
            .get(index)
            .ok_or(RecordError::OutOfRange {
                index,
                count: self.dependent_files.len(),
            })
    }

    /// All dependencies in insertion order.
    pub fn dependent_files(&self) -> &[DependentFile] {
        &self.dependent_files
    }

    /// Forgets every dependency, typically before a recompute.
    pub fn clear_dependent_files(&mut self) {
        self.dependent_files.clear();
    }

    /// Appends a dependency.
    ///
    /// If the source timestamp is still unknown and the dependency is the
    /// primary source itself, its timestamp becomes the source timestamp.
    pub fn add_dependent_file(&mut self, dep: DependentFile) {
        if self.source_timestamp.is_unknown() && dep.pathname == self.source_pathname {
            self.source_timestamp = dep.timestamp;
        }
        self.dependent_files.push(dep);
    }

    /// Stats `path` now and appends it as a dependency.
    pub fn add_dependent_path(&mut self, path: &Path, stat: &dyn FileStat, capture_hash: bool) {
        self.add_dependent_file(DependentFile::capture(path, stat, capture_hash));
    }

    /// Replaces the dependency list with the files a recompute actually read.
    pub fn replace_dependent_files(&mut self, deps: impl IntoIterator<Item = DependentFile>) {
        self.dependent_files.clear();
        for dep in deps {
            self.add_dependent_file(dep);
        }
    }

    // -- staleness --

    /// Returns the first reason this record cannot be trusted, if any.
    ///
    /// Records with no dependencies or an unknown source timestamp are always
    /// stale. Never mutates the record.
    pub fn staleness(&self, stat: &dyn FileStat, policy: StalenessPolicy) -> Option<StaleReason> {
        if self.dependent_files.is_empty() {
            return Some(StaleReason::NoDependencies);
        }
        if self.source_timestamp.is_unknown() {
            return Some(StaleReason::UnknownSourceTimestamp);
        }
        self.dependent_files
            .iter()
            .enumerate()
            .find_map(|(index, dep)| {
                dep.check(stat, policy).map(|change| StaleReason::Dependency {
                    index,
                    pathname: dep.pathname.clone(),
                    change,
                })
            })
    }

    /// Returns `true` if any dependency no longer matches its recorded state.
    pub fn is_stale(&self, stat: &dyn FileStat, policy: StalenessPolicy) -> bool {
        self.staleness(stat, policy).is_some()
    }

    // -- payload --

    /// Returns `true` if an in-memory payload is attached and reachable.
    pub fn has_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(PayloadHandle::is_alive)
    }

    /// Views the payload without taking ownership.
    pub fn get_payload(&self) -> Option<PayloadRef<'_>> {
        match self.payload.as_ref()? {
            PayloadHandle::Owned(b) => Some(PayloadRef::Direct(&**b)),
            PayloadHandle::Shared(a) => Some(PayloadRef::Direct(&**a)),
            PayloadHandle::Borrowed(w) => w.upgrade().map(PayloadRef::Upgraded),
        }
    }

    /// Releases the record's claim on its payload.
    ///
    /// An owned payload is dropped, a shared payload loses one strong count
    /// (and is dropped if that was the last), and a borrowed payload is left
    /// untouched.
    pub fn clear_payload(&mut self) {
        self.payload = None;
    }

    /// Moves the payload, and the record's claim on it, out to the caller.
    ///
    /// A shared payload keeps the count the record held; it now belongs to the
    /// returned handle.
    pub fn extract_payload(&mut self) -> Option<PayloadHandle> {
        self.payload.take().filter(PayloadHandle::is_alive)
    }

    /// Attaches a payload, releasing any different one first.
    ///
    /// Offering the object already attached, in the same ownership mode, is a
    /// no-op: the extra handle is dropped, so a shared count is held once.
    /// Offering it in a different mode, or offering a borrow whose object is
    /// gone, is rejected.
    pub fn set_payload(&mut self, handle: PayloadHandle) -> Result<(), RecordError> {
        if !handle.is_alive() {
            return Err(RecordError::InvalidArgument(
                "borrowed payload has already been dropped".to_string(),
            ));
        }
        if let Some(current) = &self.payload {
            let comparable = !matches!(current, PayloadHandle::Owned(_))
                && !matches!(handle, PayloadHandle::Owned(_));
            if comparable && current.object_addr() == handle.object_addr() {
                if current.mode() == handle.mode() {
                    return Ok(());
                }
                return Err(RecordError::InvalidArgument(format!(
                    "payload is already held as {} and cannot also be held as {}",
                    current.mode(),
                    handle.mode()
                )));
            }
        }
        self.clear_payload();
        self.payload = Some(handle);
        Ok(())
    }

    // -- eviction --

    /// Eviction order: earliest access first, ties broken by cache filename.
    pub fn cmp_access_time(&self, other: &Self) -> Ordering {
        self.record_access_time
            .cmp(&other.record_access_time)
            .then_with(|| self.cache_filename.cmp(&other.cache_filename))
    }
}

/// Sorts records into eviction order, least recently accessed first.
pub fn eviction_order<'a>(records: impl IntoIterator<Item = &'a CacheRecord>) -> Vec<&'a CacheRecord> {
    let mut ordered: Vec<&CacheRecord> = records.into_iter().collect();
    ordered.sort_by(|a, b| a.cmp_access_time(b));
    ordered
}

impl Clone for CacheRecord {
    fn clone(&self) -> Self {
        Self {
            source_pathname: self.source_pathname.clone(),
            cache_filename: self.cache_filename.clone(),
            source_timestamp: self.source_timestamp,
            recorded_time: self.recorded_time,
            record_access_time: self.record_access_time,
            record_size: self.record_size,
            dependent_files: self.dependent_files.clone(),
            payload: None,
        }
    }
}

impl PartialEq for CacheRecord {
    fn eq(&self, other: &Self) -> bool {
        self.source_pathname == other.source_pathname
            && self.cache_filename == other.cache_filename
            && self.recorded_time == other.recorded_time
            && self.record_size == other.record_size
    }
}

impl Eq for CacheRecord {}

impl fmt::Display for CacheRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {} ({} bytes, recorded {}, accessed {}, {} dependent files",
            self.cache_filename,
            self.source_pathname.display(),
            self.record_size,
            self.recorded_time,
            self.record_access_time,
            self.dependent_files.len()
        )?;
        if let Some(payload) = self.get_payload() {
            write!(f, ", holding {}", payload.kind())?;
        }
        f.write_str(")")
    }
}
