//! Shared foundational types used across the dcache workspace.
//!
//! This crate provides content hashing for cache naming and change detection,
//! and the whole-second wall-clock timestamps stored in cache records.

#![warn(missing_docs)]

pub mod hash;
pub mod time;

pub use hash::ContentHash;
pub use time::Timestamp;
