//! The merge checker (spec.md §4.F "Merge checker"): folds an undersized
//! region into an adjacent one once both sides look stable enough that a
//! merge won't immediately be undone by the replica checker or a split.
//!
//! If the candidate's peer stores don't already match the source region's,
//! a replacement operator realigning them is returned first; the merge
//! itself is only emitted once both sides sit on the same stores.
//!
//! `check()` only ever returns the active `MergeRegion` operator on the
//! source region, since a `Checker` returns at most one operator per call.
//! Its passive counterpart on the target region is synthesized and
//! submitted by the caller (the patrol sweep and heartbeat ingest both
//! route every checker operator through `pd_server`'s `submit_operator`,
//! which derives the passive side from the active one's own step).

use crate::hot_stat::HotRegionStats;
use crate::store_selector::pick_store_for_add;
use parking_lot::RwLock;
use pd_api::cluster::ClusterView;
use pd_api::ids::SyncIdSource;
use pd_api::scheduling::Checker;
use pd_operator::{build, DesiredRole};
use pd_types::config::PdConfig;
use pd_types::ids::RegionId;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::region::Region;
use pd_types::store::StoreState;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct MergeChecker {
    config: Arc<RwLock<PdConfig>>,
    id_source: Arc<dyn SyncIdSource>,
    hot_stats: Arc<HotRegionStats>,
    process_start: Instant,
    recently_split: RwLock<HashMap<RegionId, Instant>>,
}

impl MergeChecker {
    pub fn new(config: Arc<RwLock<PdConfig>>, id_source: Arc<dyn SyncIdSource>, hot_stats: Arc<HotRegionStats>) -> Self {
        Self { config, id_source, hot_stats, process_start: Instant::now(), recently_split: RwLock::new(HashMap::new()) }
    }

    /// Called by the split-observing path once a region has been split, so
    /// the new halves sit out the cool-down before being considered for a
    /// merge themselves.
    pub fn mark_recently_split(&self, region: RegionId) {
        self.recently_split.write().insert(region, Instant::now());
    }

    fn cooldown_elapsed(&self, region: RegionId, cooldown: Duration) -> bool {
        if self.process_start.elapsed() < cooldown {
            return false;
        }
        match self.recently_split.read().get(&region) {
            Some(split_at) => split_at.elapsed() >= cooldown,
            None => true,
        }
    }

    fn is_eligible(&self, region: &Region, config: &PdConfig) -> bool {
        if region.approximate_size > config.max_merge_region_size {
            return false;
        }
        if region.approximate_keys > config.max_merge_region_keys {
            return false;
        }
        if region.voter_count() != config.max_replicas as usize {
            return false;
        }
        if region.learners().next().is_some() {
            return false;
        }
        if region.peers.iter().any(|p| region.is_down(p.id) || region.is_pending(p.id)) {
            return false;
        }
        if self.hot_stats.is_hot(region.id) {
            return false;
        }
        true
    }

    fn pick_candidate(&self, prev: Option<Region>, next: Option<Region>, config: &PdConfig) -> Option<Region> {
        let prev_ok = prev.filter(|p| self.is_eligible(p, config));
        let next_ok = next.filter(|n| self.is_eligible(n, config));

        if config.enable_one_way_merge {
            return next_ok;
        }
        match (prev_ok, next_ok) {
            (Some(p), Some(n)) => Some(if p.approximate_size <= n.approximate_size { p } else { n }),
            (Some(p), None) => Some(p),
            (None, Some(n)) => Some(n),
            (None, None) => None,
        }
    }

    /// Builds the operator that moves `target`'s peers onto `region`'s
    /// stores, or `None` once they already match.
    fn align_target(&self, cluster: &dyn ClusterView, region: &Region, target: &Region, config: &PdConfig) -> Option<Operator> {
        let region_stores: HashSet<_> = region.store_ids().into_iter().collect();
        let target_stores: HashSet<_> = target.store_ids().into_iter().collect();
        if region_stores == target_stores {
            return None;
        }

        let mut desired: BTreeMap<_, _> = target
            .peers
            .iter()
            .filter(|p| region_stores.contains(&p.store_id))
            .map(|p| (p.store_id, if p.role.is_learner() { DesiredRole::Learner } else { DesiredRole::Voter }))
            .collect();

        let candidates: Vec<_> = cluster.all_stores().into_iter().filter(|s| matches!(s.state, StoreState::Up)).collect();
        for store in &region_stores {
            if !desired.contains_key(store) && !target_stores.contains(store) {
                if let Some(new_store) = pick_store_for_add(target, config, &candidates) {
                    desired.insert(new_store, DesiredRole::Voter);
                }
            }
        }

        let id_source = self.id_source.clone();
        let mut alloc = move || id_source.next_peer_id();
        build(target, &desired, target.leader.map(|l| l.store_id), false, OperatorPriority::Low, "merge-align-target", &mut alloc).ok()
    }
}

impl Checker for MergeChecker {
    fn name(&self) -> &'static str {
        "merge-checker"
    }

    fn priority(&self) -> OperatorPriority {
        OperatorPriority::Low
    }

    fn check(&self, cluster: &dyn ClusterView, region: &Region) -> Option<Operator> {
        if region.leader.is_none() || region.is_freshly_loaded() {
            return None;
        }
        let config = self.config.read();
        if !config.enable_one_way_merge && !config.enable_two_way_merge {
            return None;
        }
        let cooldown = Duration::from_secs(config.split_merge_interval_secs);
        if !self.cooldown_elapsed(region.id, cooldown) {
            return None;
        }
        if !self.is_eligible(region, &config) {
            return None;
        }

        let (prev, next) = cluster.get_adjacent_regions(region);
        let target = self.pick_candidate(prev, next, &config)?;
        if !self.cooldown_elapsed(target.id, cooldown) {
            return None;
        }

        if let Some(align_op) = self.align_target(cluster, region, &target, &config) {
            return Some(align_op);
        }

        let target_union_start = region.start_key.clone().min(target.start_key.clone());
        let target_union_end = if region.end_key.is_empty() || target.end_key.is_empty() {
            Vec::new()
        } else {
            region.end_key.clone().max(target.end_key.clone())
        };

        Some(Operator::new(
            "merge-region-active",
            region.id,
            region.epoch,
            OperatorKind::REGION | OperatorKind::MERGE,
            vec![OperatorStep::MergeRegion {
                source: region.id,
                target: target.id,
                is_passive: false,
                target_union_start,
                target_union_end,
            }],
            OperatorPriority::Low,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{up_store, FakeCluster};
    use pd_types::ids::{PeerId, StoreId};
    use pd_types::peer::Peer;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SeqIdSource(AtomicU64);
    impl SyncIdSource for SeqIdSource {
        fn next_peer_id(&self) -> PeerId {
            PeerId::new(self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    fn eligible_region(id: u64, size: u64) -> Region {
        let mut r = Region::new(RegionId::new(id), format!("k{id}").into_bytes(), format!("k{}", id + 1).into_bytes());
        r.approximate_size = size;
        let leader = Peer::new_voter(PeerId::new(id * 10), StoreId::new(1));
        r.peers = vec![leader];
        r.leader = Some(leader);
        r
    }

    fn checker() -> MergeChecker {
        let mut cfg = PdConfig::default();
        cfg.max_replicas = 1;
        cfg.split_merge_interval_secs = 0;
        MergeChecker::new(
            Arc::new(RwLock::new(cfg)),
            Arc::new(SeqIdSource(AtomicU64::new(900))),
            Arc::new(HotRegionStats::new()),
        )
    }

    #[test]
    fn skips_oversized_region() {
        let checker = checker();
        let mut region = eligible_region(1, 10);
        region.approximate_size = u64::MAX;
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        assert!(checker.check(&cluster, &region).is_none());
    }

    #[test]
    fn skips_region_with_wrong_replica_count() {
        let checker = checker();
        let mut region = eligible_region(1, 10);
        region.peers.push(Peer::new_voter(PeerId::new(2), StoreId::new(2)));
        let cluster = FakeCluster { stores: vec![up_store(1), up_store(2)] };
        assert!(checker.check(&cluster, &region).is_none());
    }

    #[test]
    fn no_candidate_without_adjacent_regions() {
        let checker = checker();
        let region = eligible_region(1, 10);
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        assert!(checker.check(&cluster, &region).is_none());
    }
}
