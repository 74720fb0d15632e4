//! Hot-region balance scheduler (spec.md §4.G "Hot-region balance"): reduces
//! read flow by transferring leadership, and write flow by moving a peer,
//! away from the busiest store.

use crate::hot_stat::{HotFlowKind, HotRegionStats};
use crate::store_selector::{passes_strict_filter, rank_candidates};
use parking_lot::RwLock;
use pd_api::cluster::ClusterView;
use pd_api::ids::SyncIdSource;
use pd_api::scheduling::Scheduler;
use pd_operator::{build, DesiredRole};
use pd_types::config::PdConfig;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::store::StoreState;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct HotRegionScheduler {
    config: Arc<RwLock<PdConfig>>,
    id_source: Arc<dyn SyncIdSource>,
    hot_stats: Arc<HotRegionStats>,
}

impl HotRegionScheduler {
    pub fn new(config: Arc<RwLock<PdConfig>>, id_source: Arc<dyn SyncIdSource>, hot_stats: Arc<HotRegionStats>) -> Self {
        Self { config, id_source, hot_stats }
    }

    fn rebalance(&self, cluster: &dyn ClusterView, kind: HotFlowKind) -> Option<Operator> {
        let source_id = self.hot_stats.busiest_store(kind)?;
        let source = cluster.get_store(source_id)?;
        let source_count = self.hot_stats.hot_count(source_id, kind);

        let config = self.config.read();
        let up_stores: Vec<_> = cluster.all_stores().into_iter().filter(|s| matches!(s.state, StoreState::Up)).collect();

        for region_id in self.hot_stats.hot_regions_of(source_id, kind) {
            let Some(region) = cluster.get_region(region_id) else { continue };

            let candidates: Vec<_> = up_stores.iter().filter(|s| s.id != source_id).cloned().collect();
            let ranked = rank_candidates(&region, &config, &candidates);
            let Some(target) = ranked.into_iter().find(|s| {
                self.hot_stats.hot_count(s.id, kind) < source_count
                    && s.region_count < source.region_count
                    && passes_strict_filter(s, &config)
            }) else {
                continue;
            };

            match kind {
                HotFlowKind::Read => {
                    return Some(Operator::new(
                        "hot-region-transfer-leader",
                        region.id,
                        region.epoch,
                        OperatorKind::LEADER | OperatorKind::BALANCE,
                        vec![OperatorStep::TransferLeader { from: source_id, to: target.id }],
                        OperatorPriority::Normal,
                    ));
                }
                HotFlowKind::Write => {
                    let mut target_map: BTreeMap<_, _> = region
                        .peers
                        .iter()
                        .map(|p| (p.store_id, if p.role.is_learner() { DesiredRole::Learner } else { DesiredRole::Voter }))
                        .collect();
                    let Some(role) = target_map.remove(&source_id) else { continue };
                    target_map.insert(target.id, role);

                    let id_source = self.id_source.clone();
                    let mut alloc = move || id_source.next_peer_id();
                    let mut op = build(
                        &region,
                        &target_map,
                        region.leader.map(|l| l.store_id),
                        false,
                        OperatorPriority::Normal,
                        "hot-region-move-peer",
                        &mut alloc,
                    )
                    .ok()?;
                    op.kind = op.kind | OperatorKind::BALANCE;
                    return Some(op);
                }
            }
        }
        None
    }
}

impl Scheduler for HotRegionScheduler {
    fn name(&self) -> &'static str {
        "hot-region-scheduler"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::REGION | OperatorKind::LEADER | OperatorKind::BALANCE
    }

    fn schedule(&self, cluster: &dyn ClusterView) -> Option<Operator> {
        self.rebalance(cluster, HotFlowKind::Read).or_else(|| self.rebalance(cluster, HotFlowKind::Write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{up_store, FakeCluster};
    use pd_types::ids::PeerId;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SeqIdSource(AtomicU64);
    impl SyncIdSource for SeqIdSource {
        fn next_peer_id(&self) -> PeerId {
            PeerId::new(self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    #[test]
    fn no_op_without_hot_regions() {
        let scheduler = HotRegionScheduler::new(
            Arc::new(RwLock::new(PdConfig::default())),
            Arc::new(SeqIdSource(AtomicU64::new(1))),
            Arc::new(HotRegionStats::new()),
        );
        let cluster = FakeCluster { stores: vec![up_store(1), up_store(2)] };
        assert!(scheduler.schedule(&cluster).is_none());
    }
}
