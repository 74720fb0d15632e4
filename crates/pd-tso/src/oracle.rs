//! The timestamp oracle (spec.md §4.I): watermark persistence, request
//! batching, and per-batch cancellation, all owned by a single serving task
//! so there is never more than one in-flight write to the persisted
//! watermark.

use async_trait::async_trait;
use pd_api::storage::PersistenceGateway;
use pd_api::tso::{Timestamp, TimestampOracle, TsoError, MAX_LOGICAL};
use pd_types::error::ErrorCode;
use pd_types::keys::TSO_TIMESTAMP_KEY;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How far ahead of the wall clock the persisted watermark is kept; a
/// failover can never resurrect a timestamp issued before this step elapses
/// on the new leader (spec.md §4.I step 1).
pub const SAVE_INTERVAL: Duration = Duration::from_secs(3);
/// Per-batch serving deadline (spec.md §4.I step 3, `pdTimeout`).
pub const BATCH_DEADLINE: Duration = Duration::from_secs(3);
/// Bounded channel capacity for queued client requests (spec.md §4.I step 2).
pub const REQUEST_CHANNEL_CAPACITY: usize = 10_000;

struct Request {
    count: u32,
    respond_to: oneshot::Sender<Result<Timestamp, TsoError>>,
}

struct ServingState {
    /// The last timestamp actually handed to a caller.
    last_issued: Timestamp,
    /// The persisted upper bound; no timestamp may be served past this.
    watermark_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn encode_watermark(watermark_ms: u64) -> [u8; 8] {
    watermark_ms.to_be_bytes()
}

fn decode_watermark(bytes: &[u8]) -> Result<u64, TsoError> {
    let arr: [u8; 8] =
        bytes.try_into().map_err(|_| TsoError::PersistenceFailure("malformed tso watermark record".into()))?;
    Ok(u64::from_be_bytes(arr))
}

async fn load_watermark(gateway: &dyn PersistenceGateway) -> Result<u64, TsoError> {
    match gateway.load(TSO_TIMESTAMP_KEY).await.map_err(|e| TsoError::PersistenceFailure(e.to_string()))? {
        Some(bytes) => decode_watermark(&bytes),
        None => Ok(0),
    }
}

async fn persist_watermark(
    gateway: &dyn PersistenceGateway,
    state: &mut ServingState,
    new_watermark_ms: u64,
) -> Result<(), TsoError> {
    if new_watermark_ms < state.watermark_ms {
        return Err(TsoError::WatermarkRegression { persisted: state.watermark_ms, requested: new_watermark_ms });
    }
    gateway
        .save(TSO_TIMESTAMP_KEY, &encode_watermark(new_watermark_ms))
        .await
        .map_err(|e| TsoError::PersistenceFailure(e.to_string()))?;
    state.watermark_ms = new_watermark_ms;
    pd_telemetry::sinks::tso_metrics().inc_watermark_persisted();
    Ok(())
}

/// Allocates `count` consecutive logical ticks against `state`, persisting a
/// fresh watermark first if the wall clock or the serving physical value has
/// caught up to it (spec.md §4.I steps 1-2).
async fn allocate_batch(
    gateway: &dyn PersistenceGateway,
    state: &mut ServingState,
    count: u32,
) -> Result<Timestamp, TsoError> {
    let now = now_ms();
    if now > state.watermark_ms {
        persist_watermark(gateway, state, now + SAVE_INTERVAL.as_millis() as u64).await?;
    }

    let mut physical = state.last_issued.physical_ms.max(now);
    let mut logical_base =
        if physical == state.last_issued.physical_ms { state.last_issued.logical + 1 } else { 0 };

    if logical_base + count as u64 > MAX_LOGICAL + 1 {
        physical += 1;
        logical_base = 0;
    }

    if physical > state.watermark_ms {
        persist_watermark(gateway, state, physical + SAVE_INTERVAL.as_millis() as u64).await?;
    }

    let first = Timestamp { physical_ms: physical, logical: logical_base };
    state.last_issued = Timestamp { physical_ms: physical, logical: logical_base + count as u64 - 1 };
    Ok(first)
}

async fn serve(gateway: Arc<dyn PersistenceGateway>, mut state: ServingState, mut rx: mpsc::Receiver<Request>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }
        let total: u32 = batch.iter().map(|r| r.count).sum();
        pd_telemetry::sinks::tso_metrics().observe_batch_size(batch.len() as f64);

        match tokio::time::timeout(BATCH_DEADLINE, allocate_batch(gateway.as_ref(), &mut state, total)).await {
            Ok(Ok(first_ts)) => {
                let mut offset = 0u64;
                for req in batch {
                    let ts = Timestamp { physical_ms: first_ts.physical_ms, logical: first_ts.logical + offset };
                    offset += req.count as u64;
                    let _ = req.respond_to.send(Ok(ts));
                }
            }
            Ok(Err(e)) => {
                pd_telemetry::sinks::tso_metrics().inc_tso_error(e.code());
                tracing::error!(target: "pd_tso", error = %e, "batch allocation failed");
                for req in batch {
                    let _ = req.respond_to.send(Err(e.clone()));
                }
            }
            Err(_elapsed) => {
                pd_telemetry::sinks::tso_metrics().inc_tso_error("batch_timeout");
                for req in batch {
                    let _ = req.respond_to.send(Err(TsoError::BatchTimeout));
                }
            }
        }
    }
}

/// A running leader-side timestamp oracle: a single owning task drains the
/// request channel, persists the watermark, and hands back assigned
/// timestamps; dropping this value stops the serving task.
pub struct TsoOracle {
    tx: mpsc::Sender<Request>,
    _task: JoinHandle<()>,
}

impl TsoOracle {
    /// Becomes leader: reads the persisted watermark, advances it past
    /// `now + SAVE_INTERVAL`, persists it, and spawns the serving task
    /// (spec.md §4.I step 1).
    pub async fn start(gateway: Arc<dyn PersistenceGateway>) -> Result<Self, TsoError> {
        let persisted = load_watermark(gateway.as_ref()).await?;
        let now = now_ms();
        let mut state = ServingState {
            last_issued: Timestamp { physical_ms: 0, logical: 0 },
            watermark_ms: persisted,
        };
        let watermark_ms = now.max(persisted + SAVE_INTERVAL.as_millis() as u64);
        persist_watermark(gateway.as_ref(), &mut state, watermark_ms).await?;

        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let task = tokio::spawn(serve(gateway, state, rx));
        Ok(Self { tx, _task: task })
    }
}

#[async_trait]
impl TimestampOracle for TsoOracle {
    async fn alloc_timestamps(&self, count: u32) -> Result<Timestamp, TsoError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Request { count, respond_to })
            .await
            .map_err(|_| TsoError::PersistenceFailure("tso serving task is not running".into()))?;
        rx.await.map_err(|_| TsoError::PersistenceFailure("tso serving task dropped the request".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use pd_api::storage::{KvPair, StorageError};
    use std::collections::HashMap;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Default)]
    struct MemGateway {
        data: TokioMutex<HashMap<String, Vec<u8>>>,
    }

    #[at]
    impl PersistenceGateway for MemGateway {
        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.data.lock().await.get(key).cloned())
        }
        async fn load_range(&self, _start: &str, _end: &str, _limit: usize) -> Result<Vec<KvPair>, StorageError> {
            Ok(vec![])
        }
        async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.data.lock().await.insert(key.to_string(), value.to_vec());
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.data.lock().await.remove(key);
            Ok(())
        }
        async fn load_range_by_prefix(
            &self,
            _prefix: &str,
            _callback: &mut (dyn FnMut(KvPair) -> bool + Send),
        ) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn issued_timestamps_are_strictly_increasing() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemGateway::default());
        let oracle = TsoOracle::start(gateway).await.expect("start oracle");

        let mut prev = oracle.alloc_timestamps(1).await.expect("alloc");
        for _ in 0..50 {
            let next = oracle.alloc_timestamps(1).await.expect("alloc");
            assert!(next > prev);
            prev = next;
        }
    }

    #[tokio::test]
    async fn monotonic_across_restart_with_same_backing_store() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemGateway::default());
        let first_leader = TsoOracle::start(gateway.clone()).await.expect("start first leader");
        let ts1 = first_leader.alloc_timestamps(1).await.expect("alloc on first leader");
        drop(first_leader);

        let second_leader = TsoOracle::start(gateway).await.expect("start second leader");
        let ts2 = second_leader.alloc_timestamps(1).await.expect("alloc on second leader");
        assert!(ts2.encode() > ts1.encode());
    }

    #[tokio::test]
    async fn concurrent_batched_requests_each_get_a_unique_timestamp() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemGateway::default());
        let oracle = Arc::new(TsoOracle::start(gateway).await.expect("start oracle"));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let oracle = oracle.clone();
            handles.push(tokio::spawn(async move { oracle.alloc_timestamps(1).await.expect("alloc") }));
        }
        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            let ts = handle.await.expect("join");
            assert!(seen.insert(ts.encode()), "duplicate timestamp issued");
        }
    }
}
