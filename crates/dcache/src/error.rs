//! Error types for cache records and cache operations.

use std::path::PathBuf;

/// Precondition violations reported by [`CacheRecord`](crate::CacheRecord).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// A dependency index was outside `[0, count)`.
    #[error("dependency index {index} out of range (record has {count})")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// The number of dependencies the record holds.
        count: usize,
    },

    /// A payload handle broke the exclusive/shared ownership discipline.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors that can occur during cache operations.
///
/// Lookups are fail-safe: unreadable or corrupt record files are logged and
/// reported as misses. These errors surface from explicit writes, payload
/// loading, and maintenance operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cache index could not be parsed.
    #[error("failed to parse cache index: {reason}")]
    IndexParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// A record file has an invalid or missing header.
    #[error("invalid record header in {path}: {reason}")]
    InvalidHeader {
        /// The record file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the checksum of the record body.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The record file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The checksum computed from the body.
        actual: String,
    },

    /// The record format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The record file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The format version found in the file.
        actual: u32,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// No decoder is registered for a stored payload kind.
    #[error("no decoder registered for payload kind '{0}'")]
    UnknownPayloadKind(String),

    /// A store was attempted on a record with no payload attached.
    #[error("record for {0} has no payload to store")]
    MissingPayload(PathBuf),

    /// A store was attempted on a record with no dependency files.
    #[error("record for {0} has no dependent files and would always be stale")]
    NoDependencies(PathBuf),

    /// Every collision slot for a cache filename belongs to another source.
    #[error("no free collision slot for cache file {0}")]
    CollisionSlotsExhausted(String),

    /// A cache file extension would place the record outside the cache root.
    #[error("invalid cache file extension {0:?}")]
    InvalidExtension(String),

    /// A record-level precondition failed.
    #[error(transparent)]
    Record(#[from] RecordError),
}
