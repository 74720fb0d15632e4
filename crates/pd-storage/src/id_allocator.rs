//! Cluster-unique id allocation backed by the persistence gateway
//! (SPEC_FULL.md §2): a monotonic counter under `raft/meta/next_id`,
//! refilled in batches of [`pd_api::ids::ID_ALLOC_BATCH_SIZE`] and cached in
//! memory so only one store round-trip happens per batch.

use async_trait::async_trait;
use pd_api::ids::{IdAllocator, IdAllocatorError, ID_ALLOC_BATCH_SIZE};
use pd_api::storage::PersistenceGateway;
use pd_types::keys::NEXT_ID_KEY;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Window {
    next: u64,
    end: u64,
}

pub struct StorageIdAllocator<G: PersistenceGateway> {
    gateway: Arc<G>,
    window: Mutex<Window>,
}

impl<G: PersistenceGateway> StorageIdAllocator<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway, window: Mutex::new(Window { next: 1, end: 1 }) }
    }

    async fn persisted_next(&self) -> Result<u64, IdAllocatorError> {
        match self.gateway.load(NEXT_ID_KEY).await.map_err(|e| IdAllocatorError::PersistenceFailure(e.to_string()))? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| IdAllocatorError::PersistenceFailure("malformed next_id record".into()))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(1),
        }
    }

    async fn persist_next(&self, next: u64) -> Result<(), IdAllocatorError> {
        self.gateway
            .save(NEXT_ID_KEY, &next.to_be_bytes())
            .await
            .map_err(|e| IdAllocatorError::PersistenceFailure(e.to_string()))
    }

    async fn refill(&self, window: &mut Window, at_least: u64) -> Result<(), IdAllocatorError> {
        let persisted = self.persisted_next().await?;
        let batch = at_least.max(ID_ALLOC_BATCH_SIZE);
        let new_end = persisted + batch;
        self.persist_next(new_end).await?;
        window.next = persisted;
        window.end = new_end;
        Ok(())
    }
}

#[async_trait]
impl<G: PersistenceGateway> IdAllocator for StorageIdAllocator<G> {
    async fn alloc_id(&self) -> Result<u64, IdAllocatorError> {
        let mut window = self.window.lock().await;
        if window.next >= window.end {
            self.refill(&mut window, 1).await?;
        }
        let id = window.next;
        window.next += 1;
        Ok(id)
    }

    async fn alloc_batch(&self, count: u64) -> Result<Range<u64>, IdAllocatorError> {
        let mut window = self.window.lock().await;
        if window.next + count > window.end {
            self.refill(&mut window, count).await?;
        }
        let start = window.next;
        window.next += count;
        Ok(start..window.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_gateway::RedbKvGateway;

    async fn gateway() -> Arc<RedbKvGateway> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.into_path().join("ids.redb");
        Arc::new(RedbKvGateway::open(path).expect("open"))
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_unique() {
        let allocator = StorageIdAllocator::new(gateway().await);
        let mut seen = std::collections::HashSet::new();
        let mut prev = 0;
        for _ in 0..10 {
            let id = allocator.alloc_id().await.expect("alloc");
            assert!(id > prev);
            assert!(seen.insert(id));
            prev = id;
        }
    }

    #[tokio::test]
    async fn batch_allocation_yields_contiguous_range() {
        let allocator = StorageIdAllocator::new(gateway().await);
        let range = allocator.alloc_batch(50).await.expect("alloc_batch");
        assert_eq!(range.len(), 50);
        let next_id = allocator.alloc_id().await.expect("alloc_id");
        assert!(next_id >= range.end);
    }
}
