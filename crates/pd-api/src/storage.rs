//! The persistence gateway contract (spec.md §4.B), abstracting the
//! embedded linearizable ordered KV store away from `pd-cluster`,
//! `pd-operator`, and `pd-tso` so none of them depend on the storage
//! backend directly.

use async_trait::async_trait;
use thiserror::Error;

/// Mirrors the shape of the kernel's own storage error enum: a backend
/// error, an encode/decode error, and not-found.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found")]
    NotFound,
}

impl pd_types::error::ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            StorageError::Backend(_) => "STORAGE_BACKEND",
            StorageError::Encode(_) => "STORAGE_ENCODE",
            StorageError::Decode(_) => "STORAGE_DECODE",
            StorageError::NotFound => "STORAGE_NOT_FOUND",
        }
    }
}

/// A single key/value pair returned from a range load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// The linearizable ordered KV contract spec.md §4.B names: `Load`,
/// `LoadRange`, `Save`, `Delete`, `LoadRangeByPrefix`. The gateway owns key
/// layout (spec.md §6) and framing; this trait only deals in already-framed
/// bytes so callers choose their own encoding per key family.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Loads up to `limit` pairs with key in `[start, end)`; `end` empty
    /// means unbounded.
    async fn load_range(&self, start: &str, end: &str, limit: usize) -> Result<Vec<KvPair>, StorageError>;

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Loads every pair under `prefix`, invoking `callback` once per pair in
    /// key order; stops early if `callback` returns `false`.
    async fn load_range_by_prefix(
        &self,
        prefix: &str,
        callback: &mut (dyn FnMut(KvPair) -> bool + Send),
    ) -> Result<(), StorageError>;
}

/// Bulk-load paging starts at this limit and adaptively halves on
/// oversize-response errors (spec.md §4.B).
pub const MAX_KV_RANGE_LIMIT: usize = 10_000;
/// Floor the adaptive limit never drops below.
pub const MIN_KV_RANGE_LIMIT: usize = 100;

/// Halves `current`, clamped to [`MIN_KV_RANGE_LIMIT`], per spec.md §4.B's
/// oversize-response backoff.
pub fn halve_range_limit(current: usize) -> usize {
    (current / 2).max(MIN_KV_RANGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_limit_halves_down_to_floor() {
        let mut limit = MAX_KV_RANGE_LIMIT;
        for _ in 0..20 {
            limit = halve_range_limit(limit);
        }
        assert_eq!(limit, MIN_KV_RANGE_LIMIT);
    }
}
