//! Blake3 hashing utilities for content-addressable storage

/// Algorithm identifier baked into integrity strings.
pub const ALGORITHM: &str = "blake3";

/// Hash raw bytes with blake3.
pub fn hash_bytes(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// Hash a configuration prefix followed by raw content.
///
/// This is the cache key derivation: the prefix is the canonical config
/// serialization, computed once per run, and the content varies per input.
pub fn hash_with_prefix(prefix: &[u8], content: &[u8]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prefix);
    hasher.update(content);
    hasher.finalize()
}

/// Integrity string for stored bytes: `blake3-<hex>`.
pub fn integrity_of(data: &[u8]) -> String {
    format!("{ALGORITHM}-{}", hash_bytes(data).to_hex())
}
