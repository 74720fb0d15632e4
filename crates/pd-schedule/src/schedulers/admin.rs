//! Admin/testing schedulers (spec.md §4.G "Evict-leader / shuffle-leader /
//! random-merge"): operator-driven tools an operator invokes explicitly,
//! rather than continuous load-balancing passes.

use pd_api::cluster::ClusterView;
use pd_api::scheduling::Scheduler;
use pd_types::ids::StoreId;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::region::Region;
use parking_lot::RwLock;
use rand::seq::SliceRandom;

/// Blocks `store` from ever being a leader source, continuously
/// transferring any leader that lands on it back out at high priority.
pub struct EvictLeaderScheduler {
    store: StoreId,
}

impl EvictLeaderScheduler {
    pub fn new(store: StoreId) -> Self {
        Self { store }
    }
}

impl Scheduler for EvictLeaderScheduler {
    fn name(&self) -> &'static str {
        "evict-leader-scheduler"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::LEADER | OperatorKind::ADMIN
    }

    fn schedule(&self, cluster: &dyn ClusterView) -> Option<Operator> {
        let no_filter: [&(dyn Fn(&Region) -> bool + Sync); 0] = [];
        let region = cluster.rand_leader_region(self.store, &no_filter)?;
        let other_voter = region
            .peers
            .iter()
            .find(|p| p.store_id != self.store && p.role.can_be_leader())?;

        Some(Operator::new(
            "evict-leader",
            region.id,
            region.epoch,
            OperatorKind::LEADER | OperatorKind::ADMIN,
            vec![OperatorStep::TransferLeader { from: self.store, to: other_voter.store_id }],
            OperatorPriority::High,
        ))
    }
}

/// Transfers leadership at random across the cluster; used to exercise
/// leader-transfer handling under test load rather than to balance.
pub struct ShuffleLeaderScheduler {
    rng: RwLock<rand::rngs::StdRng>,
}

impl ShuffleLeaderScheduler {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self { rng: RwLock::new(rand::rngs::StdRng::seed_from_u64(seed)) }
    }
}

impl Scheduler for ShuffleLeaderScheduler {
    fn name(&self) -> &'static str {
        "shuffle-leader-scheduler"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::LEADER | OperatorKind::ADMIN
    }

    fn schedule(&self, cluster: &dyn ClusterView) -> Option<Operator> {
        let stores = cluster.all_stores();
        if stores.is_empty() {
            return None;
        }
        let no_filter: [&(dyn Fn(&Region) -> bool + Sync); 0] = [];
        let mut rng = self.rng.write();
        let source = stores.choose(&mut *rng)?;
        let region = cluster.rand_leader_region(source.id, &no_filter)?;
        let candidates: Vec<_> = region.peers.iter().filter(|p| p.store_id != source.id && p.role.can_be_leader()).collect();
        let target = candidates.choose(&mut *rng)?;

        Some(Operator::new(
            "shuffle-leader",
            region.id,
            region.epoch,
            OperatorKind::LEADER | OperatorKind::ADMIN,
            vec![OperatorStep::TransferLeader { from: source.id, to: target.store_id }],
            OperatorPriority::Low,
        ))
    }
}

/// Picks a random leader region and merges it with an adjacent neighbour;
/// used to exercise merge handling under test load.
pub struct RandomMergeScheduler {
    rng: RwLock<rand::rngs::StdRng>,
}

impl RandomMergeScheduler {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self { rng: RwLock::new(rand::rngs::StdRng::seed_from_u64(seed)) }
    }
}

impl Scheduler for RandomMergeScheduler {
    fn name(&self) -> &'static str {
        "random-merge-scheduler"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::REGION | OperatorKind::ADMIN | OperatorKind::MERGE
    }

    fn schedule(&self, cluster: &dyn ClusterView) -> Option<Operator> {
        let stores = cluster.all_stores();
        let no_filter: [&(dyn Fn(&Region) -> bool + Sync); 0] = [];
        let mut rng = self.rng.write();
        let store = stores.choose(&mut *rng)?;
        let region = cluster.rand_leader_region(store.id, &no_filter)?;
        let (prev, next) = cluster.get_adjacent_regions(&region);
        let neighbour = [prev, next].into_iter().flatten().collect::<Vec<_>>();
        let target = neighbour.choose(&mut *rng)?.clone();

        let union_start = region.start_key.clone().min(target.start_key.clone());
        let union_end = if region.end_key.is_empty() || target.end_key.is_empty() {
            Vec::new()
        } else {
            region.end_key.clone().max(target.end_key.clone())
        };

        Some(Operator::new(
            "random-merge",
            region.id,
            region.epoch,
            OperatorKind::REGION | OperatorKind::ADMIN | OperatorKind::MERGE,
            vec![OperatorStep::MergeRegion {
                source: region.id,
                target: target.id,
                is_passive: false,
                target_union_start: union_start,
                target_union_end: union_end,
            }],
            OperatorPriority::Low,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{up_store, FakeCluster};

    #[test]
    fn evict_leader_no_op_without_leader_region() {
        let scheduler = EvictLeaderScheduler::new(StoreId::new(1));
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }

    #[test]
    fn shuffle_leader_no_op_on_empty_cluster() {
        let scheduler = ShuffleLeaderScheduler::new(1);
        let cluster = FakeCluster { stores: vec![] };
        assert!(scheduler.schedule(&cluster).is_none());
    }

    #[test]
    fn random_merge_no_op_without_leader_region() {
        let scheduler = RandomMergeScheduler::new(1);
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }
}
