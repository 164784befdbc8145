//! High-level cache manager.
//!
//! [`DerivedCache`] ties together the record store, the index, the payload
//! registry, and a file-stat source into the interface a loader uses: look up
//! a source, use the cached payload if the record is fresh, otherwise
//! recompute and store. It also enforces the size bound by evicting the least
//! recently accessed records.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use dcache_common::{ContentHash, Timestamp};
use dcache_config::CacheConfig;

use crate::error::CacheError;
use crate::index::{CacheIndex, INDEX_FILE};
use crate::payload::{PayloadHandle, PayloadRegistry};
use crate::record::{CacheRecord, StaleReason};
use crate::stat::{FileStat, OsFileStat};
use crate::store::RecordStore;

/// Upper bound on collision slots searched for one cache filename.
const MAX_COLLISION_SLOTS: u32 = 64;

/// Outcome of [`DerivedCache::lookup`].
#[derive(Debug)]
pub enum LookupResult {
    /// A fresh record exists; its payload can be loaded.
    Hit(CacheRecord),
    /// A record exists but is stale. The returned record is empty and ready
    /// to be repopulated.
    Stale(CacheRecord),
    /// No record exists. The returned record is empty and ready to be
    /// populated.
    Miss(CacheRecord),
}

impl LookupResult {
    /// Returns `true` for a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, LookupResult::Hit(_))
    }

    /// Returns the record regardless of outcome.
    pub fn record(&self) -> &CacheRecord {
        match self {
            LookupResult::Hit(r) | LookupResult::Stale(r) | LookupResult::Miss(r) => r,
        }
    }

    /// Consumes the result and returns the record.
    pub fn into_record(self) -> CacheRecord {
        match self {
            LookupResult::Hit(r) | LookupResult::Stale(r) | LookupResult::Miss(r) => r,
        }
    }
}

/// Where a record for a given source lives (or would live) on disk.
enum Slot {
    /// A readable record for the source exists under this name.
    Occupied(String, CacheRecord),
    /// No record for the source exists; this name is free to use.
    Vacant(String),
}

/// Disk-backed cache of derived objects.
///
/// Every mutation takes `&mut self`. To share one cache across threads, wrap
/// it in a [`SharedCache`] so lookup-check-store sequences run under one lock.
pub struct DerivedCache {
    /// Active configuration.
    config: CacheConfig,

    /// Record files under the cache root.
    store: RecordStore,

    /// Metadata-only view of all records.
    index: CacheIndex,

    /// Decoders for stored payload kinds.
    registry: PayloadRegistry,

    /// Source of dependency file state.
    stat: Box<dyn FileStat + Send + Sync>,

    /// Set when the in-memory index differs from `index.json`.
    index_dirty: bool,

    /// When the index was last written (or loaded).
    last_flush: Timestamp,

    /// Set by configuration or after a failed write.
    read_only: bool,
}

impl DerivedCache {
    /// Opens the cache described by `config`.
    ///
    /// Loads `index.json` if present and compatible, otherwise starts from an
    /// empty index. Creates the cache root unless the cache is read-only.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let store = RecordStore::new(&config.root);
        if config.active && !config.read_only {
            store.ensure_root()?;
        }
        let index = CacheIndex::load(&config.root).unwrap_or_default();
        tracing::debug!(
            root = %config.root.display(),
            records = index.len(),
            total_size = index.total_size(),
            "opened derived cache"
        );
        Ok(Self {
            read_only: config.read_only,
            config,
            store,
            index,
            registry: PayloadRegistry::default(),
            stat: Box::new(OsFileStat),
            index_dirty: false,
            last_flush: Timestamp::now(),
        })
    }

    /// Opens a cache at `root` with default settings.
    pub fn open_dir(root: &Path) -> Result<Self, CacheError> {
        Self::open(CacheConfig::with_root(root))
    }

    /// Replaces the payload registry.
    pub fn with_registry(mut self, registry: PayloadRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the file-stat source used for staleness checks.
    pub fn with_file_stat(mut self, stat: impl FileStat + Send + Sync + 'static) -> Self {
        self.stat = Box::new(stat);
        self
    }

    /// Returns the payload registry for registering additional kinds.
    pub fn registry_mut(&mut self) -> &mut PayloadRegistry {
        &mut self.registry
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Returns the file-stat source.
    pub fn file_stat(&self) -> &dyn FileStat {
        &*self.stat
    }

    /// Returns `true` if the cache is enabled.
    pub fn is_active(&self) -> bool {
        self.config.active
    }

    /// Returns `true` if writes are disabled, by configuration or because a
    /// previous write failed.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the index.
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Returns the total size of all indexed records in bytes.
    pub fn total_size(&self) -> u64 {
        self.index.total_size()
    }

    /// Returns the number of indexed records.
    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the hex hash naming the records of `source_pathname`.
    pub fn hash_filename(source_pathname: &Path) -> String {
        ContentHash::from_bytes(source_pathname.as_os_str().as_encoded_bytes()).to_hex()
    }

    /// Returns the cache filename for `source_pathname` with `extension`.
    ///
    /// Fails with [`CacheError::InvalidExtension`] if the extension contains a
    /// path separator.
    pub fn cache_filename_for(
        source_pathname: &Path,
        extension: &str,
    ) -> Result<String, CacheError> {
        let ext = extension.trim_start_matches('.');
        if ext.contains(|c: char| c == '/' || c == '\\' || c == '\0') {
            return Err(CacheError::InvalidExtension(extension.to_string()));
        }
        let stem = Self::hash_filename(source_pathname);
        if ext.is_empty() {
            Ok(stem)
        } else {
            Ok(format!("{stem}.{ext}"))
        }
    }

    /// Looks up the record for `source_pathname`.
    ///
    /// A hit refreshes the record's access time. Unreadable record files are
    /// logged and treated as misses.
    pub fn lookup(
        &mut self,
        source_pathname: &Path,
        extension: &str,
    ) -> Result<LookupResult, CacheError> {
        let cache_filename = Self::cache_filename_for(source_pathname, extension)?;
        let fresh = || CacheRecord::new(source_pathname, cache_filename.clone());

        if !self.config.active {
            return Ok(LookupResult::Miss(fresh()));
        }

        let (name, mut record) = match self.find_slot(source_pathname, &cache_filename)? {
            Slot::Occupied(name, record) => (name, record),
            Slot::Vacant(_) => {
                tracing::debug!(source = %source_pathname.display(), "cache miss");
                return Ok(LookupResult::Miss(fresh()));
            }
        };

        if let Some(reason) = record.staleness(&*self.stat, self.config.staleness) {
            tracing::debug!(
                source = %source_pathname.display(),
                file = %name,
                %reason,
                "cache record is stale"
            );
            return Ok(LookupResult::Stale(fresh()));
        }

        record.touch(Timestamp::now());
        self.index_record(&name, &record);
        if let Err(e) = self.consider_flush_index() {
            tracing::warn!(error = %e, "failed to flush cache index");
        }
        tracing::debug!(source = %source_pathname.display(), file = %name, "cache hit");
        Ok(LookupResult::Hit(record))
    }

    /// Returns why `record` is stale under the configured policy, if it is.
    pub fn staleness(&self, record: &CacheRecord) -> Option<StaleReason> {
        record.staleness(&*self.stat, self.config.staleness)
    }

    /// Returns `true` if `record` is stale under the configured policy.
    pub fn is_stale(&self, record: &CacheRecord) -> bool {
        self.staleness(record).is_some()
    }

    /// Reads the stored payload of `record` and attaches it as owned.
    ///
    /// Returns `false` if the record has no file or was stored without a
    /// payload.
    pub fn load_payload(&self, record: &mut CacheRecord) -> Result<bool, CacheError> {
        let name = match self.find_slot(record.source_pathname(), record.cache_filename())? {
            Slot::Occupied(name, _) => name,
            Slot::Vacant(_) => return Ok(false),
        };
        match self.store.read_payload(&name, &self.registry)? {
            Some(payload) => {
                record.set_payload(PayloadHandle::Owned(payload))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes `record` and its payload to the cache.
    ///
    /// On success updates the record's `recorded_time`, `record_size`, and
    /// access time, indexes it, and then evicts old records if the cache is
    /// over its size bound. Returns `false` without writing when the cache is
    /// inactive or read-only, or when the payload's kind is disabled. A failed
    /// write leaves `record` untouched.
    ///
    /// An I/O failure while writing switches the cache to read-only for the
    /// rest of the session. Metadata that cannot be encoded only fails this
    /// store.
    pub fn store(&mut self, record: &mut CacheRecord) -> Result<bool, CacheError> {
        if !self.config.active {
            return Ok(false);
        }
        if self.read_only {
            tracing::debug!(source = %record.source_pathname().display(), "cache is read-only; not storing");
            return Ok(false);
        }
        if record.dependent_file_count() == 0 {
            return Err(CacheError::NoDependencies(
                record.source_pathname().to_path_buf(),
            ));
        }

        let (kind, bytes) = {
            let payload = record
                .get_payload()
                .ok_or_else(|| CacheError::MissingPayload(record.source_pathname().to_path_buf()))?;
            (payload.kind().to_string(), payload.encode()?)
        };
        if !self.config.caches_kind(&kind) {
            tracing::debug!(%kind, "caching disabled for payload kind");
            return Ok(false);
        }

        let name = match self.find_slot(record.source_pathname(), record.cache_filename())? {
            Slot::Occupied(name, _) | Slot::Vacant(name) => name,
        };

        let now = Timestamp::now();
        let size = bytes.len() as u64;
        let mut written = record.clone();
        written.mark_recorded(now, size);
        written.touch(now);

        if let Err(e) = self.store.write_record(&name, &written, Some((&kind, &bytes))) {
            self.write_failed(&name, &e);
            return Err(e);
        }

        record.mark_recorded(now, size);
        record.touch(now);
        self.index_record(&name, &written);
        tracing::debug!(
            source = %record.source_pathname().display(),
            file = %name,
            size,
            "stored cache record"
        );

        // The record is on disk; later housekeeping failures don't undo that.
        if let Err(e) = self.check_cache_size() {
            tracing::warn!(error = %e, "failed to enforce cache size bound");
        }
        if let Err(e) = self.consider_flush_index() {
            tracing::warn!(error = %e, "failed to flush cache index");
        }
        Ok(true)
    }

    /// Rewrites the metadata of an already-stored record.
    ///
    /// The record file is rewritten, keeping its stored payload, only when
    /// `record` differs from the indexed copy in an equality-relevant way;
    /// returns `true` in that case. Records that were never stored, and
    /// inactive or read-only caches, are ignored.
    pub fn persist(&mut self, record: &CacheRecord) -> Result<bool, CacheError> {
        if !self.config.active || self.read_only {
            return Ok(false);
        }
        let Some(name) = self
            .index
            .find(record.cache_filename(), record.source_pathname())
            .map(str::to_string)
        else {
            tracing::debug!(
                source = %record.source_pathname().display(),
                "not persisting record that was never stored"
            );
            return Ok(false);
        };
        if self.index.get(&name) == Some(record) {
            return Ok(false);
        }

        let stored = self.store.read_record(&name)?;
        let payload = stored
            .payload_kind
            .as_deref()
            .map(|kind| (kind, stored.payload.as_slice()));
        if let Err(e) = self.store.write_record(&name, record, payload) {
            self.write_failed(&name, &e);
            return Err(e);
        }

        self.index_record(&name, record);
        tracing::debug!(file = %name, "persisted cache record metadata");
        Ok(true)
    }

    /// Returns every indexed record, least recently accessed first.
    pub fn evict_candidates(&self) -> Vec<&CacheRecord> {
        self.index
            .by_access_time()
            .into_iter()
            .map(|(_, rec)| rec)
            .collect()
    }

    /// Evicts the least recently accessed records until the cache fits its
    /// size bound. Returns the number of records evicted.
    pub fn check_cache_size(&mut self) -> Result<usize, CacheError> {
        let Some(max) = self.config.max_size_bytes() else {
            return Ok(0);
        };
        self.evict_to(max)
    }

    /// Evicts the least recently accessed records until the total size is at
    /// most `max_bytes`. Returns the number of records evicted.
    pub fn evict_to(&mut self, max_bytes: u64) -> Result<usize, CacheError> {
        if self.read_only {
            return Ok(0);
        }
        let mut evicted = 0;
        while self.index.total_size() > max_bytes {
            let Some(name) = self.index.oldest().map(str::to_string) else {
                break;
            };
            self.remove(&name)?;
            evicted += 1;
        }
        if evicted > 0 {
            tracing::info!(
                evicted,
                total_size = self.index.total_size(),
                max_bytes,
                "evicted cache records"
            );
        }
        Ok(evicted)
    }

    /// Deletes the record stored under on-disk name `file_name`.
    ///
    /// Returns `false` if the index did not know it.
    pub fn remove(&mut self, file_name: &str) -> Result<bool, CacheError> {
        let known = self.index.remove(file_name).is_some();
        self.store.remove(file_name)?;
        if known {
            self.index_dirty = true;
            tracing::debug!(file = %file_name, "removed cache record");
        }
        Ok(known)
    }

    /// Writes the index if it has unsaved changes.
    pub fn flush_index(&mut self) -> Result<(), CacheError> {
        if !self.index_dirty || self.read_only {
            return Ok(());
        }
        if let Err(e) = self.index.save(self.store.root()) {
            tracing::warn!(error = %e, "failed to write cache index; switching cache to read-only");
            self.read_only = true;
            return Err(e);
        }
        self.index_dirty = false;
        self.last_flush = Timestamp::now();
        Ok(())
    }

    /// Writes the index if it has unsaved changes and the flush interval has
    /// elapsed since the last write.
    pub fn consider_flush_index(&mut self) -> Result<(), CacheError> {
        let elapsed = Timestamp::now().seconds_since(self.last_flush);
        if elapsed >= self.config.flush_interval_secs {
            self.flush_index()?;
        }
        Ok(())
    }

    /// Deletes files in the cache root that the index does not know.
    ///
    /// Returns the number of files removed.
    pub fn sweep(&self) -> Result<usize, CacheError> {
        if self.read_only {
            return Ok(0);
        }
        let live: HashSet<String> = self.index.iter().map(|(name, _)| name.to_string()).collect();
        let removed = self.store.sweep(&live, &[INDEX_FILE])?;
        if removed > 0 {
            tracing::info!(removed, "swept orphaned cache files");
        }
        Ok(removed)
    }

    /// Returns the on-disk name and stale reason of every stale record.
    pub fn verify(&self) -> Vec<(String, StaleReason)> {
        self.index
            .iter()
            .filter_map(|(name, rec)| self.staleness(rec).map(|reason| (name.to_string(), reason)))
            .collect()
    }

    /// Finds the collision slot holding `source`'s record, or the first free
    /// slot for it.
    ///
    /// Every slot is checked, since removing one record leaves a gap before
    /// the slots of its collision partners. Unreadable record files are
    /// logged and reused as free slots.
    fn find_slot(&self, source: &Path, cache_filename: &str) -> Result<Slot, CacheError> {
        let mut free = None;
        for slot in 0..MAX_COLLISION_SLOTS {
            let name = RecordStore::slot_name(cache_filename, slot);
            if !self.store.record_path(&name).exists() {
                free.get_or_insert(name);
                continue;
            }
            match self.store.read_record(&name) {
                Ok(stored) if stored.record.source_pathname() == source => {
                    return Ok(Slot::Occupied(name, stored.record));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "ignoring unreadable cache record");
                    free.get_or_insert(name);
                }
            }
        }
        free.map(Slot::Vacant)
            .ok_or_else(|| CacheError::CollisionSlotsExhausted(cache_filename.to_string()))
    }

    /// Indexes `record` under `name`, dropping any other entry the index
    /// still holds for the same source.
    fn index_record(&mut self, name: &str, record: &CacheRecord) {
        let duplicates: Vec<String> = self
            .index
            .iter()
            .filter(|(other, rec)| {
                *other != name
                    && rec.cache_filename() == record.cache_filename()
                    && rec.source_pathname() == record.source_pathname()
            })
            .map(|(other, _)| other.to_string())
            .collect();
        for other in duplicates {
            tracing::debug!(file = %other, "dropping outdated index entry");
            self.index.remove(&other);
        }
        self.index.upsert(name, record);
        self.index_dirty = true;
    }

    /// Records a failed write. Only I/O failures switch the cache to
    /// read-only.
    fn write_failed(&mut self, name: &str, e: &CacheError) {
        if matches!(e, CacheError::Io { .. }) {
            tracing::warn!(
                file = %name,
                error = %e,
                "failed to write cache record; switching cache to read-only"
            );
            self.read_only = true;
        } else {
            tracing::warn!(file = %name, error = %e, "failed to encode cache record");
        }
    }
}

impl fmt::Debug for DerivedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedCache")
            .field("root", &self.store.root())
            .field("records", &self.index.len())
            .field("total_size", &self.index.total_size())
            .field("read_only", &self.read_only)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Drop for DerivedCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush_index() {
            tracing::warn!(error = %e, "failed to flush cache index on close");
        }
    }
}

/// A [`DerivedCache`] behind one lock, for use from several threads.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<DerivedCache>>,
}

impl SharedCache {
    /// Wraps `cache` for shared use.
    pub fn new(cache: DerivedCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Runs `f` with exclusive access to the cache.
    ///
    /// A lookup, staleness check, and store issued inside one call cannot
    /// interleave with another thread's access.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut DerivedCache) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}
