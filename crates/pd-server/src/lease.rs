//! Lease-backed leadership (spec.md §4.J): "a single PD instance holds the
//! cluster leadership via a lease-backed key in the consensus store." The
//! storage gateway here is a single embedded `redb` file rather than a
//! replicated consensus log, so this models the record shape a real
//! multi-node deployment would fence on, without a second writer to fence
//! against; see `DESIGN.md` for the open-question writeup.

use pd_api::storage::PersistenceGateway;
use pd_storage::codec::{decode_json, encode_json};
use pd_types::keys::status_key;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub holder: String,
    pub advertise_addr: String,
    pub expires_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn lease_key() -> String {
    status_key("leader")
}

/// Campaigns for, and renews, the cluster leadership lease.
pub struct LeaseManager<G: PersistenceGateway> {
    gateway: std::sync::Arc<G>,
    holder: String,
    advertise_addr: String,
    ttl: Duration,
}

impl<G: PersistenceGateway> LeaseManager<G> {
    pub fn new(gateway: std::sync::Arc<G>, holder: impl Into<String>, advertise_addr: impl Into<String>, ttl: Duration) -> Self {
        Self { gateway, holder: holder.into(), advertise_addr: advertise_addr.into(), ttl }
    }

    /// The current lease holder, for a non-leader node to tell a caller
    /// where to retry (spec.md §4.J "continues to serve read-only proxying
    /// by forwarding to the current leader's advertised address").
    pub async fn current_holder(&self) -> anyhow::Result<Option<LeaseRecord>> {
        self.read_lease().await
    }

    /// Attempts to become (or remain) leader. Returns `true` if this node
    /// holds the lease after the call, having written a fresh expiry.
    pub async fn campaign(&self) -> anyhow::Result<bool> {
        let now = now_ms();
        let current = self.read_lease().await?;

        let eligible = match &current {
            None => true,
            Some(record) => record.holder == self.holder || record.expires_at_ms <= now,
        };
        if !eligible {
            return Ok(false);
        }

        let record = LeaseRecord {
            holder: self.holder.clone(),
            advertise_addr: self.advertise_addr.clone(),
            expires_at_ms: now + self.ttl.as_millis() as u64,
        };
        let bytes = encode_json(&record).map_err(|e| anyhow::anyhow!("encoding lease record: {e}"))?;
        self.gateway.save(&lease_key(), &bytes).await.map_err(|e| anyhow::anyhow!("persisting lease: {e}"))?;
        Ok(true)
    }

    /// Releases the lease if, and only if, this node is the current holder.
    pub async fn resign(&self) -> anyhow::Result<()> {
        if let Some(record) = self.read_lease().await? {
            if record.holder == self.holder {
                self.gateway.delete(&lease_key()).await.map_err(|e| anyhow::anyhow!("clearing lease: {e}"))?;
            }
        }
        Ok(())
    }

    async fn read_lease(&self) -> anyhow::Result<Option<LeaseRecord>> {
        match self.gateway.load(&lease_key()).await.map_err(|e| anyhow::anyhow!("loading lease: {e}"))? {
            Some(bytes) => Ok(Some(decode_json(&bytes).map_err(|e| anyhow::anyhow!("decoding lease: {e}"))?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_api::storage::{KvPair, StorageError};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemGateway {
        data: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait::async_trait]
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
    async fn second_campaigner_is_rejected_while_lease_is_live() {
        let gateway = std::sync::Arc::new(MemGateway::default());
        let a = LeaseManager::new(gateway.clone(), "node-a", "10.0.0.1:2380", Duration::from_secs(60));
        let b = LeaseManager::new(gateway, "node-b", "10.0.0.2:2380", Duration::from_secs(60));

        assert!(a.campaign().await.expect("campaign"));
        assert!(!b.campaign().await.expect("campaign"));
    }

    #[tokio::test]
    async fn resigning_lets_another_node_win() {
        let gateway = std::sync::Arc::new(MemGateway::default());
        let a = LeaseManager::new(gateway.clone(), "node-a", "10.0.0.1:2380", Duration::from_secs(60));
        let b = LeaseManager::new(gateway, "node-b", "10.0.0.2:2380", Duration::from_secs(60));

        assert!(a.campaign().await.expect("campaign"));
        a.resign().await.expect("resign");
        assert!(b.campaign().await.expect("campaign"));
    }
}
