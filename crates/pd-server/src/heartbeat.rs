//! Region and store heartbeat ingest (spec.md §4.C): the hot path every
//! raft store periodically calls into. Region heartbeats update the cached
//! copy and hand the region to the operator controller and the checker
//! pipeline; store heartbeats feed the per-store stat filters.

use pd_api::cluster::ClusterView;
use pd_api::scheduling::Checker;
use pd_api::storage::PersistenceGateway;
use pd_controller::OperatorControllerImpl;
use pd_storage::codec::{encode_region, encode_store};
use pd_storage::RedbKvGateway;
use pd_types::keys::region_key;
use pd_types::operator::OperatorStep;
use pd_types::region::Region;
use pd_types::store::Store;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Region ids are sharded across a fixed set of locks rather than one lock
/// per id, so concurrent heartbeats for distinct regions don't serialize on
/// each other while the lock table itself stays bounded (spec.md §5).
const REGION_LOCK_SHARDS: usize = 256;

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error(transparent)]
    Cluster(#[from] pd_api::cluster::ClusterError),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl pd_types::error::ErrorCode for HeartbeatError {
    fn code(&self) -> &'static str {
        match self {
            HeartbeatError::Cluster(e) => pd_types::error::ErrorCode::code(e),
            HeartbeatError::Persistence(_) => "HEARTBEAT_PERSISTENCE_FAILURE",
        }
    }
}

struct RegionLocks {
    shards: Vec<Mutex<()>>,
}

impl RegionLocks {
    fn new() -> Self {
        Self { shards: (0..REGION_LOCK_SHARDS).map(|_| Mutex::new(())).collect() }
    }

    async fn lock(&self, region: pd_types::RegionId) -> tokio::sync::MutexGuard<'_, ()> {
        let idx = (region.get() as usize) % self.shards.len();
        self.shards[idx].lock().await
    }
}

/// Applies a region's occupancy delta (`+1` on arrival, `-1` on departure)
/// to every store holding a peer in it, so `Store`'s own counters track
/// what the cluster model actually indexes (spec.md §4.C "update per-store
/// aggregates").
fn adjust_store_counts(cluster: &dyn ClusterView, region: &Region, delta: i64) {
    for peer in &region.peers {
        let _ = cluster.update_store_status(peer.store_id, &mut |store: &mut Store| {
            let bump = |count: u32| (count as i64 + delta).max(0) as u32;
            let bump_bytes = |count: u64| (count as i64 + delta * region.approximate_size as i64).max(0) as u64;

            store.region_count = bump(store.region_count);
            store.region_size = bump_bytes(store.region_size);
            if peer.role.is_learner() {
                store.learner_count = bump(store.learner_count);
            }
            if region.is_leader_on(peer.store_id) {
                store.leader_count = bump(store.leader_count);
                store.leader_size = bump_bytes(store.leader_size);
            }
            if region.is_pending(peer.id) {
                store.pending_peer_count = bump(store.pending_peer_count);
            }
        });
    }
}

/// The heartbeat ingest pipeline: owns nothing about leadership itself, just
/// the cluster model, persistence gateway, operator controller, and checker
/// set it is handed at construction.
pub struct HeartbeatIngest {
    cluster: Arc<dyn ClusterView>,
    gateway: Arc<RedbKvGateway>,
    controller: Arc<OperatorControllerImpl>,
    checkers: Vec<Arc<dyn Checker>>,
    locks: RegionLocks,
}

impl HeartbeatIngest {
    pub fn new(
        cluster: Arc<dyn ClusterView>,
        gateway: Arc<RedbKvGateway>,
        controller: Arc<OperatorControllerImpl>,
        checkers: Vec<Arc<dyn Checker>>,
    ) -> Self {
        Self { cluster, gateway, controller, checkers, locks: RegionLocks::new() }
    }

    /// Ingests one region heartbeat (spec.md §4.C):
    /// 1. Reject if the reported epoch is stale against the cached copy.
    /// 2. Persist and index the region, evicting anything it now overlaps.
    /// 3. Update per-store aggregates for both the old and new placement.
    /// 4. Hand the region to the operator controller for step dispatch.
    /// 5. Run the checker pipeline and admit any operator it proposes.
    ///
    /// Returns the next operator step due for this region, if any, so the
    /// caller can relay it back to the reporting store.
    pub async fn region_heartbeat(&self, region: Region) -> Result<Option<OperatorStep>, HeartbeatError> {
        let _guard = self.locks.lock(region.id).await;

        if let Some(cached) = self.cluster.get_region(region.id) {
            if region.epoch.is_stale_against(&cached.epoch) {
                return Err(pd_api::cluster::ClusterError::StaleRequest { reported: region.epoch, cached: cached.epoch }.into());
            }
            adjust_store_counts(self.cluster.as_ref(), &cached, -1);
        }

        let outcome = self.cluster.put_region(region.clone());
        adjust_store_counts(self.cluster.as_ref(), &outcome.stored, 1);

        self.gateway
            .save(&region_key(outcome.stored.id), &encode_region(&outcome.stored))
            .await
            .map_err(|e| HeartbeatError::Persistence(e.to_string()))?;

        for displaced in &outcome.displaced {
            adjust_store_counts(self.cluster.as_ref(), displaced, -1);
            self.gateway
                .delete(&region_key(displaced.id))
                .await
                .map_err(|e| HeartbeatError::Persistence(e.to_string()))?;
        }

        let next_step = self.controller.dispatch(outcome.stored.id, Some(&outcome.stored));

        if eligible_for_checkers(&outcome.stored) {
            for checker in &self.checkers {
                if let Some(op) = checker.check(self.cluster.as_ref(), &outcome.stored) {
                    crate::patrol::submit_operator(self.cluster.as_ref(), &self.controller, checker.name(), op);
                    break;
                }
            }
        }

        Ok(next_step)
    }

    /// Ingests one store heartbeat (spec.md §4.C): updates the store's raw
    /// stats and feeds the available-space moving-average filter. `report`
    /// carries the raw figures as reported by the store itself, not a
    /// `Store` value, since the smoothed available-space figure and the
    /// filter state are this side's own bookkeeping.
    pub async fn store_heartbeat(&self, id: pd_types::StoreId, report: StoreStatsReport) -> Result<(), HeartbeatError> {
        self.cluster.update_store_status(id, &mut |s: &mut Store| {
            s.capacity_bytes = report.capacity_bytes;
            s.used_bytes = report.used_bytes;
            s.sending_snap_count = report.sending_snap_count;
            s.receiving_snap_count = report.receiving_snap_count;
            s.applying_snap_count = report.applying_snap_count;
            s.is_busy = report.is_busy;
            s.last_heartbeat = std::time::SystemTime::now();
            s.observe_available(report.available_bytes);
        })?;

        if let Some(store) = self.cluster.get_store(id) {
            self.gateway
                .save(&pd_types::keys::store_key(id), &encode_store(&store))
                .await
                .map_err(|e| HeartbeatError::Persistence(e.to_string()))?;
        }
        Ok(())
    }
}

/// Raw stats carried on a store heartbeat, before smoothing (spec.md §4.C).
#[derive(Debug, Clone, Copy)]
pub struct StoreStatsReport {
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub sending_snap_count: u32,
    pub receiving_snap_count: u32,
    pub applying_snap_count: u32,
    pub is_busy: bool,
}

fn eligible_for_checkers(region: &Region) -> bool {
    region.leader.is_some() && region.approximate_size > 0
}
