//! A `redb`-backed implementation of [`pd_api::storage::PersistenceGateway`]
//! (spec.md §4.B) over a single ordered table, following the background
//! async-commit-thread design of the kernel's epoch store: writes land in a
//! pending-write map synchronously (for read-your-writes) and are queued to
//! a dedicated OS thread that owns the `redb::Database` handle, with a
//! bounded channel applying backpressure once the thread falls behind.

use async_trait::async_trait;
use pd_api::storage::{KvPair, PersistenceGateway, StorageError};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::thread;
use tokio::sync::{mpsc, Mutex};

const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("KV");

#[derive(Debug)]
enum PendingWrite {
    Put(Vec<u8>),
    Delete,
}

#[derive(Debug)]
enum KvOp {
    Put(String, Vec<u8>),
    Delete(String),
}

#[derive(Clone)]
pub struct RedbKvGateway {
    db: Arc<Database>,
    pending: Arc<RwLock<BTreeMap<String, PendingWrite>>>,
    tx_sender: mpsc::Sender<KvOp>,
    _flusher_handle: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl RedbKvGateway {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let w = db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(KV).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        let (tx, mut rx) = mpsc::channel::<KvOp>(1024);
        let pending = Arc::new(RwLock::new(BTreeMap::new()));
        let db_arc = Arc::new(db);

        let db_clone = db_arc.clone();
        let pending_clone = pending.clone();
        let handle = thread::spawn(move || {
            while let Some(op) = rx.blocking_recv() {
                let key = match &op {
                    KvOp::Put(k, _) | KvOp::Delete(k) => k.clone(),
                };
                let write_res = (|| -> Result<(), redb::Error> {
                    let w = db_clone.begin_write()?;
                    {
                        let mut table = w.open_table(KV)?;
                        match &op {
                            KvOp::Put(k, v) => {
                                table.insert(k.as_str(), v.as_slice())?;
                            }
                            KvOp::Delete(k) => {
                                table.remove(k.as_str())?;
                            }
                        }
                    }
                    w.commit()?;
                    Ok(())
                })();

                if let Err(e) = write_res {
                    tracing::error!(target: "pd_storage", key = %key, error = %e, "background kv write failed");
                }

                if let Ok(mut guard) = pending_clone.write() {
                    guard.remove(&key);
                }
            }
        });

        Ok(Self { db: db_arc, pending, tx_sender: tx, _flusher_handle: Arc::new(Mutex::new(Some(handle))) })
    }

    fn read_from_db(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(KV).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(t.get(key).map_err(|e| StorageError::Backend(e.to_string()))?.map(|v| v.value().to_vec()))
    }
}

#[async_trait]
impl PersistenceGateway for RedbKvGateway {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if let Ok(guard) = self.pending.read() {
            match guard.get(key) {
                Some(PendingWrite::Put(v)) => return Ok(Some(v.clone())),
                Some(PendingWrite::Delete) => return Ok(None),
                None => {}
            }
        }
        self.read_from_db(key)
    }

    async fn load_range(&self, start: &str, end: &str, limit: usize) -> Result<Vec<KvPair>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(KV).map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut merged: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();
        let range_iter = if end.is_empty() {
            t.range(start..).map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            t.range(start..end).map_err(|e| StorageError::Backend(e.to_string()))?
        };
        for entry in range_iter {
            let (k, v) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
            merged.insert(k.value().to_string(), Some(v.value().to_vec()));
        }

        if let Ok(guard) = self.pending.read() {
            for (k, pending_write) in guard.iter() {
                let in_range = k.as_str() >= start && (end.is_empty() || k.as_str() < end);
                if !in_range {
                    continue;
                }
                match pending_write {
                    PendingWrite::Put(v) => {
                        merged.insert(k.clone(), Some(v.clone()));
                    }
                    PendingWrite::Delete => {
                        merged.remove(k);
                    }
                }
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| KvPair { key, value: v }))
            .take(limit)
            .collect())
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if let Ok(mut guard) = self.pending.write() {
            guard.insert(key.to_string(), PendingWrite::Put(value.to_vec()));
        }
        self.tx_sender
            .send(KvOp::Put(key.to_string(), value.to_vec()))
            .await
            .map_err(|e| StorageError::Backend(format!("failed to queue write: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if let Ok(mut guard) = self.pending.write() {
            guard.insert(key.to_string(), PendingWrite::Delete);
        }
        self.tx_sender
            .send(KvOp::Delete(key.to_string()))
            .await
            .map_err(|e| StorageError::Backend(format!("failed to queue delete: {e}")))
    }

    async fn load_range_by_prefix(
        &self,
        prefix: &str,
        callback: &mut (dyn FnMut(KvPair) -> bool + Send),
    ) -> Result<(), StorageError> {
        // redb has no native upper-bound "next prefix" helper for arbitrary
        // strings, so an empty `end` with manual `starts_with` filtering is
        // used instead of trying to compute a successor string.
        let pairs = self.load_range(prefix, "", usize::MAX).await?;
        for pair in pairs {
            if !pair.key.starts_with(prefix) {
                break;
            }
            if !callback(pair) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gateway() -> RedbKvGateway {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.into_path().join("pd.redb");
        RedbKvGateway::open(path).expect("open gateway")
    }

    #[tokio::test]
    async fn save_then_load_is_read_your_writes() {
        let gw = gateway().await;
        gw.save("raft/s/00000000000000000001", b"store-bytes").await.expect("save");
        let loaded = gw.load("raft/s/00000000000000000001").await.expect("load");
        assert_eq!(loaded, Some(b"store-bytes".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_pending_and_committed_value() {
        let gw = gateway().await;
        gw.save("k", b"v").await.expect("save");
        gw.delete("k").await.expect("delete");
        assert_eq!(gw.load("k").await.expect("load"), None);
    }

    #[tokio::test]
    async fn load_range_by_prefix_stops_at_prefix_boundary() {
        let gw = gateway().await;
        gw.save("rules/aa-01", b"1").await.expect("save");
        gw.save("rules/aa-02", b"2").await.expect("save");
        gw.save("rule_group/1", b"3").await.expect("save");

        let mut seen = Vec::new();
        gw.load_range_by_prefix("rules/", &mut |pair| {
            seen.push(pair.key);
            true
        })
        .await
        .expect("scan");

        assert_eq!(seen, vec!["rules/aa-01".to_string(), "rules/aa-02".to_string()]);
    }
}
