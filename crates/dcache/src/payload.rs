//! In-memory payloads attached to cache records.
//!
//! A payload is any derived object the cache can hold: a converted model, a
//! compressed texture, a bounding volume. Kinds form an open set; each kind
//! names itself through [`Payload::kind`] and registers a decoder with a
//! [`PayloadRegistry`] so stored bytes can be turned back into objects.
//!
//! Ownership of an attached payload is expressed by [`PayloadHandle`]: the
//! record either owns it outright, co-owns it through an `Arc`, or merely
//! borrows it through a `Weak` while the caller keeps it alive.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Capability every cacheable object provides.
pub trait Payload: Any + Send + Sync + fmt::Debug {
    /// Registry key for this payload's decoder.
    fn kind(&self) -> &str;

    /// Serializes the payload for storage in a record file.
    fn encode(&self) -> Result<Vec<u8>, CacheError>;

    /// Approximate in-memory footprint in bytes.
    fn size_in_bytes(&self) -> usize;

    /// Upcast used for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Payload {
    /// Returns the payload as a `T` if that is its concrete type.
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// How a record holds its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipMode {
    /// The record is the sole owner.
    Owned,
    /// The record holds one strong count in a shared allocation.
    Shared,
    /// The record holds no count; the caller keeps the object alive.
    Borrowed,
}

impl fmt::Display for OwnershipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OwnershipMode::Owned => "owned",
            OwnershipMode::Shared => "shared",
            OwnershipMode::Borrowed => "borrowed",
        };
        f.write_str(s)
    }
}

/// A payload together with the record's claim on it.
///
/// `Borrowed` is a non-owning reference: dropping the record (or clearing its
/// payload) never releases the object, and once every strong owner is gone
/// the record simply stops reporting a payload.
#[derive(Debug)]
pub enum PayloadHandle {
    /// Exclusively owned by whoever holds the handle.
    Owned(Box<dyn Payload>),
    /// One strong reference in a shared allocation.
    Shared(Arc<dyn Payload>),
    /// A non-owning reference to a caller-owned allocation.
    Borrowed(Weak<dyn Payload>),
}

impl PayloadHandle {
    /// Wraps a value the record will own exclusively.
    pub fn owned<T: Payload>(payload: T) -> Self {
        PayloadHandle::Owned(Box::new(payload))
    }

    /// Takes one additional strong count on `payload`.
    pub fn shared(payload: &Arc<dyn Payload>) -> Self {
        PayloadHandle::Shared(Arc::clone(payload))
    }

    /// Refers to `payload` without taking a strong count.
    pub fn borrowed(payload: &Arc<dyn Payload>) -> Self {
        PayloadHandle::Borrowed(Arc::downgrade(payload))
    }

    /// Returns how the handle holds its object.
    pub fn mode(&self) -> OwnershipMode {
        match self {
            PayloadHandle::Owned(_) => OwnershipMode::Owned,
            PayloadHandle::Shared(_) => OwnershipMode::Shared,
            PayloadHandle::Borrowed(_) => OwnershipMode::Borrowed,
        }
    }

    /// Returns `true` unless this is a borrow whose object has been dropped.
    pub fn is_alive(&self) -> bool {
        match self {
            PayloadHandle::Borrowed(weak) => weak.strong_count() > 0,
            _ => true,
        }
    }

    /// Address of the referenced object, used for identity comparisons.
    pub(crate) fn object_addr(&self) -> *const () {
        match self {
            PayloadHandle::Owned(b) => &**b as *const dyn Payload as *const (),
            PayloadHandle::Shared(a) => Arc::as_ptr(a) as *const (),
            PayloadHandle::Borrowed(w) => Weak::as_ptr(w) as *const (),
        }
    }

    /// Upgrades to a shared handle, converting an owned box or a live borrow.
    ///
    /// Returns `None` for a borrow whose object has been dropped.
    pub fn into_shared(self) -> Option<Arc<dyn Payload>> {
        match self {
            PayloadHandle::Owned(b) => Some(Arc::from(b)),
            PayloadHandle::Shared(a) => Some(a),
            PayloadHandle::Borrowed(w) => w.upgrade(),
        }
    }
}

/// A borrowed view of a record's payload.
///
/// Owned and shared payloads are viewed in place. A borrowed payload is
/// upgraded for the lifetime of the view, so the caller's object cannot be
/// dropped out from under it.
pub enum PayloadRef<'a> {
    /// A reference into the record's own storage.
    Direct(&'a (dyn Payload + 'static)),
    /// A temporary strong reference to a borrowed payload.
    Upgraded(Arc<dyn Payload>),
}

impl Deref for PayloadRef<'_> {
    type Target = dyn Payload;

    fn deref(&self) -> &Self::Target {
        match self {
            PayloadRef::Direct(p) => *p,
            PayloadRef::Upgraded(a) => a.as_ref(),
        }
    }
}

impl fmt::Debug for PayloadRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Decoder for one payload kind.
pub type DecodeFn = fn(&[u8]) -> Result<Box<dyn Payload>, CacheError>;

/// Dispatch table from payload kind names to decoders.
#[derive(Clone)]
pub struct PayloadRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl PayloadRegistry {
    /// Creates a registry with no kinds registered.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Creates a registry that knows the built-in kinds.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::empty();
        registry.register(BlobPayload::KIND, BlobPayload::decode);
        registry.register(BoundingVolume::KIND, BoundingVolume::decode);
        registry
    }

    /// Registers (or replaces) the decoder for `kind`.
    pub fn register(&mut self, kind: &str, decode: DecodeFn) {
        self.decoders.insert(kind.to_string(), decode);
    }

    /// Returns `true` if a decoder is registered for `kind`.
    pub fn is_registered(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Decodes stored bytes of the given kind.
    pub fn decode(&self, kind: &str, bytes: &[u8]) -> Result<Box<dyn Payload>, CacheError> {
        let decode = self
            .decoders
            .get(kind)
            .ok_or_else(|| CacheError::UnknownPayloadKind(kind.to_string()))?;
        decode(bytes)
    }
}

impl Default for PayloadRegistry {
    fn default() -> Self {
        Self::with_builtin_kinds()
    }
}

impl fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("PayloadRegistry").field("kinds", &kinds).finish()
    }
}

/// Opaque bytes produced by some external conversion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPayload {
    bytes: Vec<u8>,
}

impl BlobPayload {
    /// Kind name under which blobs are stored.
    pub const KIND: &'static str = "blob";

    /// Wraps the given bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Returns the wrapped bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn decode(bytes: &[u8]) -> Result<Box<dyn Payload>, CacheError> {
        Ok(Box::new(Self::new(bytes)))
    }
}

impl Payload for BlobPayload {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(self.bytes.clone())
    }

    fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A precomputed bounding volume, cached alongside the geometry it bounds.
///
/// The cache treats it as opaque; intersection tests live with the geometry
/// code that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundingVolume {
    /// A sphere given by center and radius.
    Sphere {
        /// Center point.
        center: [f32; 3],
        /// Radius.
        radius: f32,
    },
    /// An axis-aligned box given by its minimum and maximum corners.
    Box {
        /// Minimum corner.
        min: [f32; 3],
        /// Maximum corner.
        max: [f32; 3],
    },
}

impl BoundingVolume {
    /// Kind name under which bounding volumes are stored.
    pub const KIND: &'static str = "bounding_volume";

    fn decode(bytes: &[u8]) -> Result<Box<dyn Payload>, CacheError> {
        let (volume, _): (BoundingVolume, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(
                |e| CacheError::Serialization {
                    reason: e.to_string(),
                },
            )?;
        Ok(Box::new(volume))
    }
}

impl Payload for BoundingVolume {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
            CacheError::Serialization {
                reason: e.to_string(),
            }
        })
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_decodes_builtin_kinds() {
        let registry = PayloadRegistry::default();
        let blob = BlobPayload::new(b"converted model".to_vec());
        let bytes = blob.encode().unwrap();
        let decoded = registry.decode(BlobPayload::KIND, &bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<BlobPayload>(), Some(&blob));

        let volume = BoundingVolume::Sphere {
            center: [1.0, 2.0, 3.0],
            radius: 4.5,
        };
        let bytes = volume.encode().unwrap();
        let decoded = registry.decode(BoundingVolume::KIND, &bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<BoundingVolume>(), Some(&volume));
    }

    #[test]
    fn registry_rejects_unknown_kind() {
        let registry = PayloadRegistry::empty();
        let err = registry.decode("blob", b"x").unwrap_err();
        assert!(matches!(err, CacheError::UnknownPayloadKind(k) if k == "blob"));
    }

    #[test]
    fn registry_accepts_custom_kind() {
        fn decode_reversed(bytes: &[u8]) -> Result<Box<dyn Payload>, CacheError> {
            Ok(Box::new(BlobPayload::new(bytes.iter().rev().copied().collect::<Vec<_>>())))
        }
        let mut registry = PayloadRegistry::empty();
        registry.register("reversed", decode_reversed);
        assert!(registry.is_registered("reversed"));
        let decoded = registry.decode("reversed", b"abc").unwrap();
        assert_eq!(
            decoded.downcast_ref::<BlobPayload>().unwrap().bytes(),
            b"cba"
        );
    }

    #[test]
    fn corrupt_bounding_volume_is_serialization_error() {
        let registry = PayloadRegistry::default();
        let err = registry.decode(BoundingVolume::KIND, &[0xff]).unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }

    #[test]
    fn downcast_to_wrong_type_is_none() {
        let p: Box<dyn Payload> = Box::new(BlobPayload::new(vec![1, 2]));
        assert!(p.downcast_ref::<BoundingVolume>().is_none());
    }

    #[test]
    fn handle_modes() {
        let arc: Arc<dyn Payload> = Arc::new(BlobPayload::new(vec![]));
        assert_eq!(
            PayloadHandle::owned(BlobPayload::new(vec![])).mode(),
            OwnershipMode::Owned
        );
        assert_eq!(PayloadHandle::shared(&arc).mode(), OwnershipMode::Shared);
        assert_eq!(PayloadHandle::borrowed(&arc).mode(), OwnershipMode::Borrowed);
    }

    #[test]
    fn shared_and_borrowed_point_at_same_object() {
        let arc: Arc<dyn Payload> = Arc::new(BlobPayload::new(vec![9]));
        let shared = PayloadHandle::shared(&arc);
        let borrowed = PayloadHandle::borrowed(&arc);
        assert_eq!(shared.object_addr(), borrowed.object_addr());
    }

    #[test]
    fn borrowed_handle_dies_with_owner() {
        let arc: Arc<dyn Payload> = Arc::new(BlobPayload::new(vec![9]));
        let borrowed = PayloadHandle::borrowed(&arc);
        assert!(borrowed.is_alive());
        drop(arc);
        assert!(!borrowed.is_alive());
        assert!(borrowed.into_shared().is_none());
    }

    #[test]
    fn payload_ref_derefs_to_payload() {
        let blob = BlobPayload::new(b"xyz".to_vec());
        let view = PayloadRef::Direct(&blob);
        assert_eq!(view.kind(), "blob");
        assert_eq!(view.size_in_bytes(), 3);
    }
}
