//! File-state queries used for dependency tracking.
//!
//! Records never touch the file system directly; they ask a [`FileStat`] for
//! the current size, modification time, and (when the policy wants it) content
//! hash of each dependency. [`OsFileStat`] answers from the real file system;
//! [`MemoryFileStat`] answers from an in-memory table for virtual sources.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dcache_common::{ContentHash, Timestamp};

/// Size and modification time of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Modification time, whole seconds.
    pub timestamp: Timestamp,
    /// Size in bytes.
    pub size: u64,
}

/// Source of file state for staleness checks.
///
/// Implementations may block on I/O. A `NotFound` error means the file is
/// missing; any other error means its state could not be determined.
pub trait FileStat {
    /// Returns the current size and modification time of `path`.
    fn stat(&self, path: &Path) -> io::Result<FileInfo>;

    /// Returns the content hash of `path`.
    fn hash(&self, path: &Path) -> io::Result<ContentHash>;
}

/// [`FileStat`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileStat;

impl FileStat for OsFileStat {
    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(FileInfo {
            timestamp: Timestamp::from_system_time(meta.modified()?),
            size: meta.len(),
        })
    }

    fn hash(&self, path: &Path) -> io::Result<ContentHash> {
        ContentHash::from_reader(File::open(path)?)
    }
}

/// [`FileStat`] over an in-memory table of files.
///
/// Useful for sources that do not live on the real file system, and for
/// exercising staleness without touching the disk.
#[derive(Debug, Default)]
pub struct MemoryFileStat {
    inner: Mutex<MemoryFiles>,
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: HashMap<PathBuf, (FileInfo, ContentHash)>,
    denied: HashSet<PathBuf>,
}

impl MemoryFileStat {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file with the given modification time and content.
    pub fn insert(&self, path: impl Into<PathBuf>, mtime: Timestamp, content: &[u8]) {
        let info = FileInfo {
            timestamp: mtime,
            size: content.len() as u64,
        };
        self.lock()
            .files
            .insert(path.into(), (info, ContentHash::from_bytes(content)));
    }

    /// Changes only the modification time of an existing file.
    pub fn set_mtime(&self, path: &Path, mtime: Timestamp) {
        if let Some((info, _)) = self.lock().files.get_mut(path) {
            info.timestamp = mtime;
        }
    }

    /// Removes a file.
    pub fn remove(&self, path: &Path) {
        self.lock().files.remove(path);
    }

    /// Makes every query for `path` fail with `PermissionDenied`.
    pub fn deny(&self, path: impl Into<PathBuf>) {
        self.lock().denied.insert(path.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, path: &Path) -> io::Result<(FileInfo, ContentHash)> {
        let files = self.lock();
        if files.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not accessible", path.display()),
            ));
        }
        files.files.get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }
}

impl FileStat for MemoryFileStat {
    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        self.lookup(path).map(|(info, _)| info)
    }

    fn hash(&self, path: &Path) -> io::Result<ContentHash> {
        self.lookup(path).map(|(_, hash)| hash)
    }
}
