//! Dependency files and their change detection.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use dcache_common::{ContentHash, Timestamp};
use dcache_config::StalenessPolicy;
use serde::{Deserialize, Serialize};

use crate::stat::FileStat;

/// A file whose change invalidates a cache record.
///
/// Captures the file's modification time and size at the moment the derived
/// data was computed, and optionally its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentFile {
    /// Path of the dependency as the converter read it.
    pub pathname: PathBuf,
    /// Modification time when recorded; unknown if the file was missing.
    pub timestamp: Timestamp,
    /// Size in bytes when recorded.
    pub size: u64,
    /// Content hash when recorded, if it was computed.
    pub content_hash: Option<ContentHash>,
}

/// Why a dependency no longer matches its recorded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyChange {
    /// The file does not exist.
    Missing,
    /// The file could not be stat'ed or hashed.
    Unreadable,
    /// The file was missing when the record was built.
    Unrecorded,
    /// The modification time differs.
    TimestampChanged,
    /// The size differs.
    SizeChanged,
}

impl fmt::Display for DependencyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyChange::Missing => "missing",
            DependencyChange::Unreadable => "unreadable",
            DependencyChange::Unrecorded => "not recorded",
            DependencyChange::TimestampChanged => "modification time changed",
            DependencyChange::SizeChanged => "size changed",
        };
        f.write_str(s)
    }
}

impl DependentFile {
    /// Creates a dependency from already-known file state.
    pub fn new(pathname: impl Into<PathBuf>, timestamp: Timestamp, size: u64) -> Self {
        Self {
            pathname: pathname.into(),
            timestamp,
            size,
            content_hash: None,
        }
    }

    /// Attaches a recorded content hash.
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    /// Captures the current state of `path`.
    ///
    /// A file that cannot be stat'ed is recorded with an unknown timestamp,
    /// which keeps any record depending on it stale. When `capture_hash` is
    /// set the content hash is recorded as well.
    pub fn capture(path: &Path, stat: &dyn FileStat, capture_hash: bool) -> Self {
        match stat.stat(path) {
            Ok(info) => {
                let content_hash = if capture_hash {
                    stat.hash(path).ok()
                } else {
                    None
                };
                Self {
                    pathname: path.to_path_buf(),
                    timestamp: info.timestamp,
                    size: info.size,
                    content_hash,
                }
            }
            Err(_) => Self::new(path, Timestamp::UNKNOWN, 0),
        }
    }

    /// Compares the recorded state against the file as it is now.
    ///
    /// Returns `None` when the dependency is unchanged under `policy`.
    pub fn check(&self, stat: &dyn FileStat, policy: StalenessPolicy) -> Option<DependencyChange> {
        let info = match stat.stat(&self.pathname) {
            Ok(info) => info,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Some(DependencyChange::Missing)
            }
            Err(_) => return Some(DependencyChange::Unreadable),
        };
        if self.timestamp.is_unknown() {
            return Some(DependencyChange::Unrecorded);
        }

        let change = if info.timestamp != self.timestamp {
            DependencyChange::TimestampChanged
        } else if policy.compares_size() && info.size != self.size {
            DependencyChange::SizeChanged
        } else {
            return None;
        };

        if policy == StalenessPolicy::ContentHash && info.size == self.size {
            if let Some(recorded) = self.content_hash {
                match stat.hash(&self.pathname) {
                    Ok(current) if current == recorded => return None,
                    Ok(_) => {}
                    Err(_) => return Some(DependencyChange::Unreadable),
                }
            }
        }
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::MemoryFileStat;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn capture_records_current_state() {
        let fs = MemoryFileStat::new();
        fs.insert("a.egg", ts(100), b"abcd");
        let dep = DependentFile::capture(Path::new("a.egg"), &fs, false);
        assert_eq!(dep.timestamp, ts(100));
        assert_eq!(dep.size, 4);
        assert!(dep.content_hash.is_none());

        let dep = DependentFile::capture(Path::new("a.egg"), &fs, true);
        assert_eq!(dep.content_hash, Some(ContentHash::from_bytes(b"abcd")));
    }

    #[test]
    fn capture_missing_is_unknown() {
        let fs = MemoryFileStat::new();
        let dep = DependentFile::capture(Path::new("gone.egg"), &fs, true);
        assert!(dep.timestamp.is_unknown());
        assert_eq!(dep.size, 0);
    }

    #[test]
    fn unchanged_file_passes() {
        let fs = MemoryFileStat::new();
        fs.insert("a.egg", ts(100), b"abcd");
        let dep = DependentFile::new("a.egg", ts(100), 4);
        assert_eq!(dep.check(&fs, StalenessPolicy::TimestampAndSize), None);
    }

    #[test]
    fn missing_and_unreadable() {
        let fs = MemoryFileStat::new();
        fs.insert("locked.egg", ts(1), b"x");
        fs.deny("locked.egg");
        let dep = DependentFile::new("gone.egg", ts(1), 1);
        assert_eq!(
            dep.check(&fs, StalenessPolicy::Timestamp),
            Some(DependencyChange::Missing)
        );
        let dep = DependentFile::new("locked.egg", ts(1), 1);
        assert_eq!(
            dep.check(&fs, StalenessPolicy::Timestamp),
            Some(DependencyChange::Unreadable)
        );
    }

    #[test]
    fn unrecorded_timestamp_is_change() {
        let fs = MemoryFileStat::new();
        fs.insert("late.egg", ts(100), b"x");
        let dep = DependentFile::new("late.egg", Timestamp::UNKNOWN, 1);
        assert_eq!(
            dep.check(&fs, StalenessPolicy::TimestampAndSize),
            Some(DependencyChange::Unrecorded)
        );
    }

    #[test]
    fn size_only_matters_when_policy_compares_it() {
        let fs = MemoryFileStat::new();
        fs.insert("a.egg", ts(100), b"abcdef");
        let dep = DependentFile::new("a.egg", ts(100), 4);
        assert_eq!(dep.check(&fs, StalenessPolicy::Timestamp), None);
        assert_eq!(
            dep.check(&fs, StalenessPolicy::TimestampAndSize),
            Some(DependencyChange::SizeChanged)
        );
    }

    #[test]
    fn content_hash_forgives_touched_file() {
        let fs = MemoryFileStat::new();
        fs.insert("a.egg", ts(200), b"abcd");
        let dep = DependentFile::new("a.egg", ts(100), 4).with_hash(ContentHash::from_bytes(b"abcd"));
        assert_eq!(dep.check(&fs, StalenessPolicy::ContentHash), None);
        assert_eq!(
            dep.check(&fs, StalenessPolicy::TimestampAndSize),
            Some(DependencyChange::TimestampChanged)
        );
    }

    #[test]
    fn content_hash_detects_rewrite() {
        let fs = MemoryFileStat::new();
        fs.insert("a.egg", ts(200), b"wxyz");
        let dep = DependentFile::new("a.egg", ts(100), 4).with_hash(ContentHash::from_bytes(b"abcd"));
        assert_eq!(
            dep.check(&fs, StalenessPolicy::ContentHash),
            Some(DependencyChange::TimestampChanged)
        );
    }

    #[test]
    fn content_hash_without_recorded_hash_falls_back() {
        let fs = MemoryFileStat::new();
        fs.insert("a.egg", ts(200), b"abcd");
        let dep = DependentFile::new("a.egg", ts(100), 4);
        assert_eq!(
            dep.check(&fs, StalenessPolicy::ContentHash),
            Some(DependencyChange::TimestampChanged)
        );
    }
}
