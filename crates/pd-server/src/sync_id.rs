//! A synchronous peer/region-id source (spec.md §1(b)) backed by
//! [`pd_api::ids::IdAllocator`]: checkers and schedulers run outside an
//! async context and need to mint an id without awaiting, so a background
//! task keeps a pre-fetched window flowing through a bounded channel.

use pd_api::ids::{IdAllocator, SyncIdSource, ID_ALLOC_BATCH_SIZE};
use pd_types::PeerId;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::time::Duration;
use tokio::task::JoinHandle;

async fn fill<A: IdAllocator + 'static>(allocator: std::sync::Arc<A>, tx: SyncSender<u64>) {
    let mut backoff = Duration::from_millis(100);
    loop {
        match allocator.alloc_batch(ID_ALLOC_BATCH_SIZE).await {
            Ok(range) => {
                backoff = Duration::from_millis(100);
                for id in range {
                    // blocks only once the buffer is full, which throttles
                    // refilling to actual consumption.
                    if tx.send(id).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::error!(target: "pd_server", error = %e, "id window refill failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(5));
            }
        }
    }
}

/// A [`SyncIdSource`] whose window is refilled by a dedicated background
/// task, bridging the sync caller side to the async [`IdAllocator`].
pub struct BackgroundIdSource {
    rx: Receiver<u64>,
    _task: JoinHandle<()>,
}

impl BackgroundIdSource {
    pub fn spawn<A: IdAllocator + 'static>(allocator: std::sync::Arc<A>) -> Self {
        let (tx, rx) = sync_channel(ID_ALLOC_BATCH_SIZE as usize);
        let task = tokio::spawn(fill(allocator, tx));
        Self { rx, _task: task }
    }
}

impl SyncIdSource for BackgroundIdSource {
    fn next_peer_id(&self) -> PeerId {
        loop {
            match self.rx.recv() {
                Ok(id) => return PeerId::new(id),
                Err(_) => {
                    tracing::error!(target: "pd_server", "id refill task has exited; retrying");
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}
