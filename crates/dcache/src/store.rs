//! Record files on disk.
//!
//! Every cache record lives in one file directly under the cache root. The
//! file starts with a binary header (magic bytes, format version, payload kind,
//! checksum), followed by the record metadata and then the encoded payload:
//!
//! ```text
//! u32 LE header length | bincode header | u32 LE metadata length | bincode metadata | payload
//! ```
//!
//! The checksum covers everything after the header, so a truncated or
//! tampered file is rejected as a whole.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use dcache_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::payload::{Payload, PayloadRegistry};
use crate::record::CacheRecord;

/// Magic bytes identifying a dcache record file.
const RECORD_MAGIC: [u8; 4] = *b"DCRC";

/// Current record format version. Increment on breaking changes to the
/// header, metadata, or payload layout.
const RECORD_FORMAT_VERSION: u32 = 1;

/// Header prepended to every record file for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Magic bytes: must be `b"DCRC"`.
    pub magic: [u8; 4],

    /// Record format version.
    pub format_version: u32,

    /// Kind of the stored payload, if the record carries one.
    pub payload_kind: Option<String>,

    /// Content hash of everything after the header.
    pub checksum: ContentHash,
}

/// A record file decoded into its parts.
#[derive(Debug)]
pub struct StoredRecord {
    /// The record metadata. Never carries a payload.
    pub record: CacheRecord,
    /// Kind of the stored payload.
    pub payload_kind: Option<String>,
    /// The encoded payload bytes.
    pub payload: Vec<u8>,
}

/// Reads and writes record files under a cache root.
#[derive(Debug, Clone)]
pub struct RecordStore {
    /// Root cache directory.
    cache_dir: PathBuf,
}

impl RecordStore {
    /// Creates a store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        &self.cache_dir
    }

    /// Ensures the cache root exists.
    pub fn ensure_root(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::Io {
            path: self.cache_dir.clone(),
            source: e,
        })
    }

    /// Returns the path of the record file with the given on-disk name.
    pub fn record_path(&self, file_name: &str) -> PathBuf {
        self.cache_dir.join(file_name)
    }

    /// Returns the on-disk name for collision slot `slot` of `cache_filename`.
    ///
    /// Slot 0 is the cache filename itself; later slots insert `_<n>` before
    /// the extension, so `ab12.bam` becomes `ab12_1.bam`, `ab12_2.bam`, ...
    pub fn slot_name(cache_filename: &str, slot: u32) -> String {
        if slot == 0 {
            return cache_filename.to_string();
        }
        match cache_filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{slot}.{ext}"),
            _ => format!("{cache_filename}_{slot}"),
        }
    }

    /// Writes a record file and returns the number of payload bytes written.
    ///
    /// The file is written to a temporary name in the cache root and renamed
    /// into place, so readers never observe a partial record. Metadata that
    /// cannot be encoded fails with [`CacheError::Serialization`] before the
    /// cache root is touched.
    pub fn write_record(
        &self,
        file_name: &str,
        record: &CacheRecord,
        payload: Option<(&str, &[u8])>,
    ) -> Result<u64, CacheError> {
        let meta_bytes = encode(record)?;
        let payload_bytes = payload.map(|(_, bytes)| bytes).unwrap_or_default();

        let mut body = Vec::with_capacity(4 + meta_bytes.len() + payload_bytes.len());
        body.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&meta_bytes);
        body.extend_from_slice(payload_bytes);

        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: RECORD_FORMAT_VERSION,
            payload_kind: payload.map(|(kind, _)| kind.to_string()),
            checksum: ContentHash::from_bytes(&body),
        };
        let header_bytes = encode(&header)?;

        self.ensure_root()?;

        let mut output = Vec::with_capacity(4 + header_bytes.len() + body.len());
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&body);

        let path = self.record_path(file_name);
        let io_err = |e: std::io::Error| CacheError::Io {
            path: path.clone(),
            source: e,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir).map_err(io_err)?;
        tmp.write_all(&output).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        Ok(payload_bytes.len() as u64)
    }

    /// Reads and validates a record file.
    pub fn read_record(&self, file_name: &str) -> Result<StoredRecord, CacheError> {
        let path = self.record_path(file_name);
        let raw = std::fs::read(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;

        let (header_bytes, body) = split_prefixed(&raw).ok_or_else(|| CacheError::InvalidHeader {
            path: path.clone(),
            reason: "truncated header".to_string(),
        })?;

        let header: RecordHeader = decode(header_bytes).map_err(|e| CacheError::InvalidHeader {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if header.magic != RECORD_MAGIC {
            return Err(CacheError::InvalidHeader {
                path,
                reason: "missing magic bytes".to_string(),
            });
        }

        if header.format_version != RECORD_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path,
                expected: RECORD_FORMAT_VERSION,
                actual: header.format_version,
            });
        }

        let actual = ContentHash::from_bytes(body);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected: header.checksum.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let (meta_bytes, payload) = split_prefixed(body).ok_or_else(|| CacheError::InvalidHeader {
            path: path.clone(),
            reason: "truncated metadata".to_string(),
        })?;
        let record: CacheRecord = decode(meta_bytes)?;

        Ok(StoredRecord {
            record,
            payload_kind: header.payload_kind,
            payload: payload.to_vec(),
        })
    }

    /// Reads a record file and decodes its payload through `registry`.
    ///
    /// Returns `None` if the record was stored without a payload.
    pub fn read_payload(
        &self,
        file_name: &str,
        registry: &PayloadRegistry,
    ) -> Result<Option<Box<dyn Payload>>, CacheError> {
        let stored = self.read_record(file_name)?;
        match stored.payload_kind {
            Some(kind) => registry.decode(&kind, &stored.payload).map(Some),
            None => Ok(None),
        }
    }

    /// Deletes a record file. Returns `false` if it did not exist.
    pub fn remove(&self, file_name: &str) -> Result<bool, CacheError> {
        let path = self.record_path(file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    /// Lists the names of all regular files in the cache root except `skip`.
    pub fn list_files(&self, skip: &[&str]) -> Result<Vec<String>, CacheError> {
        let dir = &self.cache_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Io {
                path: dir.clone(),
                source: e,
            })?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !skip.contains(&name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Removes record files whose names are not in `live`.
    ///
    /// Files named in `skip` (the index itself) are never touched. Returns the
    /// number of files removed.
    pub fn sweep(&self, live: &HashSet<String>, skip: &[&str]) -> Result<usize, CacheError> {
        let mut removed = 0;
        for name in self.list_files(skip)? {
            if !live.contains(&name) && self.remove(&name)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Splits a `u32 LE length`-prefixed block off the front of `raw`.
fn split_prefixed(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let len_bytes: [u8; 4] = raw.get(..4)?.try_into().ok()?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let end = 4usize.checked_add(len)?;
    Some((raw.get(4..end)?, &raw[end..]))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
}
