//! Leader-balance scheduler (spec.md §4.G "Leader-balance"): symmetric to
//! region-balance but moves leadership rather than peers, so it never
//! allocates a peer id.

use crate::hot_stat::HotRegionStats;
use crate::should_balance::{leader_score, should_balance, BalanceKind, NoInfluence, OpInfluenceProvider, DEFAULT_LEADER_TOLERANCE};
use pd_api::cluster::ClusterView;
use pd_api::scheduling::Scheduler;
use pd_types::ids::StoreId;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::region::Region;
use pd_types::store::{Store, StoreState};
use std::sync::Arc;

pub struct LeaderBalanceScheduler {
    hot_stats: Arc<HotRegionStats>,
    influence: Arc<dyn OpInfluenceProvider>,
}

impl LeaderBalanceScheduler {
    pub fn new(hot_stats: Arc<HotRegionStats>) -> Self {
        Self { hot_stats, influence: Arc::new(NoInfluence) }
    }

    pub fn with_influence(mut self, influence: Arc<dyn OpInfluenceProvider>) -> Self {
        self.influence = influence;
        self
    }

    fn pick_leader_region(&self, cluster: &dyn ClusterView, store: StoreId) -> Option<Region> {
        let not_hot = |r: &Region| !self.hot_stats.is_hot(r.id);
        let preds: [&(dyn Fn(&Region) -> bool + Sync); 1] = [&not_hot];
        cluster.rand_leader_region(store, &preds)
    }
}

impl Scheduler for LeaderBalanceScheduler {
    fn name(&self) -> &'static str {
        "balance-leader-scheduler"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::LEADER | OperatorKind::BALANCE
    }

    fn schedule(&self, cluster: &dyn ClusterView) -> Option<Operator> {
        let mut stores: Vec<Store> = cluster.all_stores().into_iter().filter(|s| matches!(s.state, StoreState::Up)).collect();
        if stores.len() < 2 {
            return None;
        }
        stores.sort_by(|a, b| leader_score(b, 0.0).partial_cmp(&leader_score(a, 0.0)).unwrap_or(std::cmp::Ordering::Equal));

        for source in &stores {
            let Some(region) = self.pick_leader_region(cluster, source.id) else { continue };

            let Some(target) = region
                .peers
                .iter()
                .filter(|p| p.role.can_be_leader() && p.store_id != source.id)
                .filter_map(|p| stores.iter().find(|s| s.id == p.store_id))
                .min_by(|a, b| leader_score(a, 0.0).partial_cmp(&leader_score(b, 0.0)).unwrap_or(std::cmp::Ordering::Equal))
            else {
                continue;
            };

            let influence_s = self.influence.influence(source.id, BalanceKind::Leader);
            let influence_t = self.influence.influence(target.id, BalanceKind::Leader);
            if !should_balance(source, target, BalanceKind::Leader, DEFAULT_LEADER_TOLERANCE, influence_s, influence_t) {
                continue;
            }

            return Some(Operator::new(
                "balance-leader",
                region.id,
                region.epoch,
                OperatorKind::LEADER | OperatorKind::BALANCE,
                vec![OperatorStep::TransferLeader { from: source.id, to: target.id }],
                OperatorPriority::Normal,
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{up_store, FakeCluster};

    #[test]
    fn no_op_with_fewer_than_two_stores() {
        let scheduler = LeaderBalanceScheduler::new(Arc::new(HotRegionStats::new()));
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }

    #[test]
    fn no_op_when_no_leader_region_found() {
        let scheduler = LeaderBalanceScheduler::new(Arc::new(HotRegionStats::new()));
        let cluster = FakeCluster { stores: vec![up_store(1), up_store(2)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }
}
