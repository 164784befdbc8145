//! Disk-backed derived-object cache.
//!
//! A [`CacheRecord`] remembers, for one source input, a previously computed
//! derived representation together with the files it was computed from. The
//! [`DerivedCache`] manager maps source pathnames to record files under a cache
//! root, answers lookups with hit/stale/miss results, stores freshly computed
//! payloads, and evicts least-recently-accessed records to bound the cache size.

#![warn(missing_docs)]

pub mod cache;
pub mod dependency;
pub mod error;
pub mod index;
pub mod payload;
pub mod record;
pub mod stat;
pub mod store;

pub use cache::{DerivedCache, LookupResult, SharedCache};
pub use dcache_config::{CacheConfig, StalenessPolicy};
pub use dependency::{DependencyChange, DependentFile};
pub use error::{CacheError, RecordError};
pub use index::CacheIndex;
pub use payload::{
    BlobPayload, BoundingVolume, OwnershipMode, Payload, PayloadHandle, PayloadRef,
    PayloadRegistry,
};
pub use record::{eviction_order, CacheRecord, StaleReason};
pub use stat::{FileInfo, FileStat, MemoryFileStat, OsFileStat};
pub use store::RecordStore;
