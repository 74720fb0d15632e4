//! The replica / rule checker (spec.md §4.F): per-peer health repair, voter
//! count correction, and location improvement.

use crate::store_selector::{pick_store_for_add, rank_candidates, passes_strict_filter};
use parking_lot::RwLock;
use pd_api::cluster::ClusterView;
use pd_api::ids::SyncIdSource;
use pd_api::scheduling::Checker;
use pd_operator::{build, DesiredRole};
use pd_types::config::PdConfig;
use pd_types::ids::StoreId;
use pd_types::operator::{Operator, OperatorPriority};
use pd_types::region::Region;
use pd_types::rules::isolation_score;
use pd_types::store::{Store, StoreState};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct ReplicaChecker {
    config: Arc<RwLock<PdConfig>>,
    id_source: Arc<dyn SyncIdSource>,
}

impl ReplicaChecker {
    pub fn new(config: Arc<RwLock<PdConfig>>, id_source: Arc<dyn SyncIdSource>) -> Self {
        Self { config, id_source }
    }

    fn target_map(region: &Region) -> BTreeMap<StoreId, DesiredRole> {
        region
            .peers
            .iter()
            .map(|p| (p.store_id, if p.role.is_learner() { DesiredRole::Learner } else { DesiredRole::Voter }))
            .collect()
    }

    fn up_store_pool(&self, cluster: &dyn ClusterView) -> Vec<pd_types::store::Store> {
        cluster.all_stores().into_iter().filter(|s| matches!(s.state, StoreState::Up)).collect()
    }

    fn replace(
        &self,
        cluster: &dyn ClusterView,
        region: &Region,
        bad_store: StoreId,
        reason: &'static str,
    ) -> Option<Operator> {
        let config = self.config.read();
        let mut target = Self::target_map(region);
        let desired_role = target.remove(&bad_store)?;
        let candidates = self.up_store_pool(cluster);
        let new_store = pick_store_for_add(region, &config, &candidates)?;
        target.insert(new_store, desired_role);
        let id_source = self.id_source.clone();
        let mut alloc = move || id_source.next_peer_id();
        build(
            region,
            &target,
            region.leader.map(|l| l.store_id),
            false,
            OperatorPriority::High,
            format!("replace-{reason}-replica"),
            &mut alloc,
        )
        .ok()
    }

    fn make_up_replica(&self, cluster: &dyn ClusterView, region: &Region) -> Option<Operator> {
        let config = self.config.read();
        let mut target = Self::target_map(region);
        let candidates = self.up_store_pool(cluster);
        let new_store = pick_store_for_add(region, &config, &candidates)?;
        target.insert(new_store, DesiredRole::Voter);
        let id_source = self.id_source.clone();
        let mut alloc = move || id_source.next_peer_id();
        build(
            region,
            &target,
            region.leader.map(|l| l.store_id),
            false,
            OperatorPriority::High,
            "make-up-replica",
            &mut alloc,
        )
        .ok()
    }

    /// Location-improvement swap (spec.md §4.F, final step): finds the
    /// voter contributing the least to the region's isolation score — the
    /// one whose location labels most closely duplicate another voter's —
    /// and proposes swapping it for the best-ranked candidate, but only
    /// when that candidate's isolation score against the rest of the set
    /// is strictly higher than the one it would replace (spec.md §8: "a
    /// replica checker never outputs a replacement whose target has a
    /// strictly lower isolation score than the source").
    fn improve_location(&self, cluster: &dyn ClusterView, region: &Region) -> Option<Operator> {
        let config = self.config.read();
        if !config.enable_location_replacement {
            return None;
        }

        let voter_ids: Vec<StoreId> = region.voters().map(|p| p.store_id).collect();
        let existing: Vec<Store> = voter_ids.iter().filter_map(|id| cluster.get_store(*id)).collect();
        if existing.len() != voter_ids.len() || existing.len() < 2 {
            return None;
        }

        let (weakest_id, weakest_score) = existing
            .iter()
            .map(|store| {
                let rest: Vec<&Store> = existing.iter().filter(|s| s.id != store.id).collect();
                (store.id, isolation_score(&config.location_labels, store, &rest))
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        let rest_without_weakest: Vec<&Store> = existing.iter().filter(|s| s.id != weakest_id).collect();
        let candidates = self.up_store_pool(cluster);
        let replacement = rank_candidates(region, &config, &candidates)
            .into_iter()
            .find(|s| passes_strict_filter(s, &config))?;
        let replacement_score = isolation_score(&config.location_labels, &replacement, &rest_without_weakest);

        if replacement_score <= weakest_score {
            return None;
        }

        let mut target = Self::target_map(region);
        target.remove(&weakest_id);
        target.insert(replacement.id, DesiredRole::Voter);
        let id_source = self.id_source.clone();
        let mut alloc = move || id_source.next_peer_id();
        build(
            region,
            &target,
            region.leader.map(|l| l.store_id),
            false,
            OperatorPriority::Low,
            "location-replacement",
            &mut alloc,
        )
        .ok()
    }

    fn remove_extra_replica(&self, region: &Region) -> Option<Operator> {
        let mut target = Self::target_map(region);
        let extra = region.voters().last()?.store_id;
        target.remove(&extra);
        let mut alloc = crate::no_alloc_needed;
        build(
            region,
            &target,
            region.leader.map(|l| l.store_id),
            false,
            OperatorPriority::Normal,
            "remove-extra-replica",
            &mut alloc,
        )
        .ok()
    }
}

impl Checker for ReplicaChecker {
    fn name(&self) -> &'static str {
        "replica-checker"
    }

    fn priority(&self) -> OperatorPriority {
        OperatorPriority::High
    }

    fn check(&self, cluster: &dyn ClusterView, region: &Region) -> Option<Operator> {
        if region.leader.is_none() || region.is_freshly_loaded() {
            return None;
        }
        let max_store_down_time = self.config.read().max_store_down_time_secs;

        for peer in &region.peers {
            let store = cluster.get_store(peer.store_id);
            let is_down = store.as_ref().map(|s| s.seconds_since_heartbeat() > max_store_down_time).unwrap_or(true)
                && region.down_seconds_of(peer.id).map(|s| s > max_store_down_time).unwrap_or(false);
            let is_offline = store.as_ref().map(|s| matches!(s.state, StoreState::Offline)).unwrap_or(false);
            let is_pending_only = !is_down && !is_offline && region.is_pending(peer.id);

            if is_down {
                if let Some(op) = self.replace(cluster, region, peer.store_id, "down") {
                    return Some(op);
                }
            } else if is_offline {
                if let Some(op) = self.replace(cluster, region, peer.store_id, "offline") {
                    return Some(op);
                }
            } else if is_pending_only {
                if let Some(op) = self.replace(cluster, region, peer.store_id, "pending") {
                    return Some(op);
                }
            }
        }

        let max_replicas = self.config.read().max_replicas as usize;
        let voters = region.voter_count();
        if voters < max_replicas {
            return self.make_up_replica(cluster, region);
        }
        if voters > max_replicas {
            return self.remove_extra_replica(region);
        }

        self.improve_location(cluster, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{up_store, FakeCluster};
    use pd_types::ids::{PeerId, RegionId};
    use pd_types::peer::Peer;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SeqIdSource(AtomicU64);
    impl SyncIdSource for SeqIdSource {
        fn next_peer_id(&self) -> PeerId {
            PeerId::new(self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    #[test]
    fn makes_up_missing_replica() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        let leader = Peer::new_voter(PeerId::new(1), StoreId::new(1));
        region.peers = vec![leader];
        region.leader = Some(leader);

        let cluster = FakeCluster { stores: vec![up_store(1), up_store(2)] };
        let checker =
            ReplicaChecker::new(Arc::new(RwLock::new(PdConfig::default())), Arc::new(SeqIdSource(AtomicU64::new(50))));

        let op = checker.check(&cluster, &region).expect("should make up replica");
        assert!(op.description.contains("make-up-replica"));
    }

    #[test]
    fn swaps_the_weakest_voter_for_a_better_isolated_store() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        let peers = vec![
            Peer::new_voter(PeerId::new(1), StoreId::new(1)),
            Peer::new_voter(PeerId::new(2), StoreId::new(2)),
            Peer::new_voter(PeerId::new(3), StoreId::new(3)),
        ];
        region.leader = Some(peers[0]);
        region.peers = peers;

        let mut store1 = up_store(1);
        store1.labels.insert("zone".to_string(), "z1".to_string());
        let mut store2 = up_store(2);
        store2.labels.insert("zone".to_string(), "z1".to_string());
        let mut store3 = up_store(3);
        store3.labels.insert("zone".to_string(), "z1".to_string());
        let mut store4 = up_store(4);
        store4.labels.insert("zone".to_string(), "z2".to_string());

        let cluster = FakeCluster { stores: vec![store1, store2, store3, store4] };

        let mut config = PdConfig::default();
        config.max_replicas = 3;
        config.location_labels = vec!["zone".to_string()];
        let checker =
            ReplicaChecker::new(Arc::new(RwLock::new(config)), Arc::new(SeqIdSource(AtomicU64::new(50))));

        let op = checker.check(&cluster, &region).expect("should propose a location swap");
        assert!(op.description.contains("location-replacement"));
    }

    #[test]
    fn leaves_an_already_isolated_region_alone() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        let peers = vec![
            Peer::new_voter(PeerId::new(1), StoreId::new(1)),
            Peer::new_voter(PeerId::new(2), StoreId::new(2)),
            Peer::new_voter(PeerId::new(3), StoreId::new(3)),
        ];
        region.leader = Some(peers[0]);
        region.peers = peers;

        let mut store1 = up_store(1);
        store1.labels.insert("zone".to_string(), "z1".to_string());
        let mut store2 = up_store(2);
        store2.labels.insert("zone".to_string(), "z2".to_string());
        let mut store3 = up_store(3);
        store3.labels.insert("zone".to_string(), "z3".to_string());

        let cluster = FakeCluster { stores: vec![store1, store2, store3] };

        let mut config = PdConfig::default();
        config.max_replicas = 3;
        config.location_labels = vec!["zone".to_string()];
        let checker =
            ReplicaChecker::new(Arc::new(RwLock::new(config)), Arc::new(SeqIdSource(AtomicU64::new(50))));

        assert!(checker.check(&cluster, &region).is_none());
    }

    #[test]
    fn skips_freshly_loaded_region() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.leader = Some(Peer::new_voter(PeerId::new(1), StoreId::new(1)));
        let cluster = FakeCluster { stores: vec![up_store(1)] };
        let checker =
            ReplicaChecker::new(Arc::new(RwLock::new(PdConfig::default())), Arc::new(SeqIdSource(AtomicU64::new(1))));
        assert!(checker.check(&cluster, &region).is_none());
    }
}
