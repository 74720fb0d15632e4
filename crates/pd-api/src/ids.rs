//! Cluster-unique id allocation (spec.md §1(b), expanded in SPEC_FULL.md §2):
//! a monotonic counter persisted under `raft/meta/next_id`, handed out in
//! batches so the hot path rarely touches storage.

use async_trait::async_trait;
use pd_types::PeerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdAllocatorError {
    #[error("persistence failure allocating ids: {0}")]
    PersistenceFailure(String),
}

/// Allocates raw `u64` ids used to mint both region ids and peer ids
/// (spec.md's "cluster-unique identifiers" does not distinguish the two by
/// namespace).
#[async_trait]
pub trait IdAllocator: Send + Sync {
    async fn alloc_id(&self) -> Result<u64, IdAllocatorError>;

    /// Allocates `count` consecutive ids at once, for operator builders that
    /// need several peer ids for one operator.
    async fn alloc_batch(&self, count: u64) -> Result<std::ops::Range<u64>, IdAllocatorError>;
}

/// Ids are handed out from an in-memory window refilled from storage this
/// many at a time (SPEC_FULL.md §2).
pub const ID_ALLOC_BATCH_SIZE: u64 = 1000;

/// A synchronous facade over an [`IdAllocator`]'s in-memory window, for
/// callers (checkers, schedulers, the operator builder) that run outside an
/// async context and only need "mint one more peer id", never a refill.
/// Implementations keep their own pre-fetched window, topped up from the
/// underlying [`IdAllocator`] by a background task.
pub trait SyncIdSource: Send + Sync {
    fn next_peer_id(&self) -> PeerId;
}

