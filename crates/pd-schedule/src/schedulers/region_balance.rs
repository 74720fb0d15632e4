//! Region-balance scheduler (spec.md §4.G "Region-balance"): moves a peer
//! off the most over-utilized store onto an isolation-preserving,
//! better-utilized one, gated by [`crate::should_balance::should_balance`].

use crate::hot_stat::HotRegionStats;
use crate::should_balance::{region_score, should_balance, tolerant_resource, tolerant_size_ratio, BalanceKind, NoInfluence, OpInfluenceProvider};
use crate::store_selector::pick_store_for_add;
use parking_lot::RwLock;
use pd_api::cluster::ClusterView;
use pd_api::ids::SyncIdSource;
use pd_api::scheduling::Scheduler;
use pd_operator::{build, DesiredRole};
use pd_types::config::PdConfig;
use pd_types::ids::StoreId;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority};
use pd_types::region::Region;
use pd_types::store::{Store, StoreState};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct RegionBalanceScheduler {
    config: Arc<RwLock<PdConfig>>,
    id_source: Arc<dyn SyncIdSource>,
    hot_stats: Arc<HotRegionStats>,
    influence: Arc<dyn OpInfluenceProvider>,
}

impl RegionBalanceScheduler {
    pub fn new(config: Arc<RwLock<PdConfig>>, id_source: Arc<dyn SyncIdSource>, hot_stats: Arc<HotRegionStats>) -> Self {
        Self { config, id_source, hot_stats, influence: Arc::new(NoInfluence) }
    }

    pub fn with_influence(mut self, influence: Arc<dyn OpInfluenceProvider>) -> Self {
        self.influence = influence;
        self
    }

    fn pick_source_region(&self, cluster: &dyn ClusterView, store: StoreId) -> Option<Region> {
        let not_hot = |r: &Region| !self.hot_stats.is_hot(r.id);
        let preds: [&(dyn Fn(&Region) -> bool + Sync); 1] = [&not_hot];
        cluster
            .rand_pending_region(store, &preds)
            .or_else(|| cluster.rand_follower_region(store, &preds))
            .or_else(|| cluster.rand_leader_region(store, &preds))
    }

    fn average_region_size(stores: &[Store]) -> f64 {
        let total_size: u64 = stores.iter().map(|s| s.region_size).sum();
        let total_regions: u64 = stores.iter().map(|s| s.region_count as u64).sum();
        total_size as f64 / total_regions.max(1) as f64
    }
}

impl Scheduler for RegionBalanceScheduler {
    fn name(&self) -> &'static str {
        "balance-region-scheduler"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::REGION | OperatorKind::BALANCE
    }

    fn schedule(&self, cluster: &dyn ClusterView) -> Option<Operator> {
        let config = self.config.read();
        let mut stores: Vec<Store> = cluster.all_stores().into_iter().filter(|s| matches!(s.state, StoreState::Up)).collect();
        if stores.len() < 2 {
            return None;
        }
        stores.sort_by(|a, b| region_score(b, 0.0).partial_cmp(&region_score(a, 0.0)).unwrap_or(std::cmp::Ordering::Equal));

        let average_region_size = Self::average_region_size(&stores);
        let tolerant_ratio = tolerant_size_ratio(config.tolerant_size_ratio.max(0.01), stores.len());

        for source in &stores {
            let Some(region) = self.pick_source_region(cluster, source.id) else { continue };

            let candidates: Vec<Store> = stores.iter().filter(|s| s.id != source.id).cloned().collect();
            let Some(new_store_id) = pick_store_for_add(&region, &config, &candidates) else { continue };
            let Some(target) = candidates.iter().find(|s| s.id == new_store_id) else { continue };

            let tolerant = tolerant_resource(BalanceKind::Region, region.approximate_size, average_region_size, tolerant_ratio);
            let influence_s = self.influence.influence(source.id, BalanceKind::Region);
            let influence_t = self.influence.influence(target.id, BalanceKind::Region);
            if !should_balance(source, target, BalanceKind::Region, tolerant, influence_s, influence_t) {
                continue;
            }

            let mut target_map: BTreeMap<_, _> = region
                .peers
                .iter()
                .map(|p| (p.store_id, if p.role.is_learner() { DesiredRole::Learner } else { DesiredRole::Voter }))
                .collect();
            let Some(role) = target_map.remove(&source.id) else { continue };
            target_map.insert(target.id, role);

            let id_source = self.id_source.clone();
            let mut alloc = move || id_source.next_peer_id();
            let mut op = build(
                &region,
                &target_map,
                region.leader.map(|l| l.store_id),
                false,
                OperatorPriority::Normal,
                "balance-region",
                &mut alloc,
            )
            .ok()?;
            op.kind = op.kind | OperatorKind::BALANCE;
            return Some(op);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{up_store, FakeCluster};
    use pd_types::ids::PeerId;
    use pd_types::peer::Peer;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SeqIdSource(AtomicU64);
    impl SyncIdSource for SeqIdSource {
        fn next_peer_id(&self) -> PeerId {
            PeerId::new(self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    #[test]
    fn no_op_with_fewer_than_two_stores() {
        let scheduler = RegionBalanceScheduler::new(
            Arc::new(RwLock::new(PdConfig::default())),
            Arc::new(SeqIdSource(AtomicU64::new(1))),
            Arc::new(HotRegionStats::new()),
        );
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }

    #[test]
    fn no_op_when_cluster_has_no_regions_to_move() {
        // FakeCluster's rand_*_region stubs always return None, matching a
        // cluster the scheduler has nothing to act on yet.
        let scheduler = RegionBalanceScheduler::new(
            Arc::new(RwLock::new(PdConfig::default())),
            Arc::new(SeqIdSource(AtomicU64::new(1))),
            Arc::new(HotRegionStats::new()),
        );
        let cluster = FakeCluster { stores: vec![up_store(1), up_store(2)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }

    #[test]
    fn ranked_stores_put_more_loaded_first() {
        let mut busy = up_store(1);
        busy.region_size = 900;
        let mut idle = up_store(2);
        idle.region_size = 10;
        let mut stores = vec![idle.clone(), busy.clone()];
        stores.sort_by(|a, b| region_score(b, 0.0).partial_cmp(&region_score(a, 0.0)).unwrap());
        assert_eq!(stores[0].id, busy.id);
        let _ = Peer::new_voter(PeerId::new(1), StoreId::new(1));
    }
}
