//! memopipe-store: Content-addressable store for transform results
//!
//! Persists transform outputs under their blake3 cache key with an
//! integrity sidecar, enabling deterministic cache lookups across
//! processes. Writes are staged and published by atomic rename.

pub mod hash;
pub mod store;

pub use hash::{hash_bytes, hash_with_prefix, integrity_of, ALGORITHM};
pub use store::{Content, Store, StoreEntry, VerifyResult};
