//! In-memory `ClusterView` implementation (spec.md §4.A): stores, regions,
//! the region tree, and the per-store leader/follower/learner/pending
//! position sets used for the random-selection operations schedulers rely on.

use crate::region_tree::RegionTree;
use crate::selection::PositionSet;
use pd_api::cluster::{ClusterError, ClusterView, PutRegionOutcome, RegionPredicate, RANDOM_REGION_MAX_RETRY};
use pd_types::{PeerRole, Region, RegionId, Store, StoreId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    stores: HashMap<StoreId, Store>,
    regions: HashMap<RegionId, Region>,
    tree: RegionTree,
    leader_regions: HashMap<StoreId, PositionSet>,
    follower_regions: HashMap<StoreId, PositionSet>,
    learner_regions: HashMap<StoreId, PositionSet>,
    pending_regions: HashMap<StoreId, PositionSet>,
}

impl Inner {
    fn index_region(&mut self, region: &Region) {
        for peer in &region.peers {
            if peer.role.is_learner() {
                self.learner_regions.entry(peer.store_id).or_default().insert(region.id);
            } else if region.is_leader_on(peer.store_id) {
                self.leader_regions.entry(peer.store_id).or_default().insert(region.id);
            } else {
                self.follower_regions.entry(peer.store_id).or_default().insert(region.id);
            }
            if region.is_pending(peer.id) {
                self.pending_regions.entry(peer.store_id).or_default().insert(region.id);
            }
        }
    }

    fn deindex_region(&mut self, region: &Region) {
        for peer in &region.peers {
            if let Some(set) = self.leader_regions.get_mut(&peer.store_id) {
                set.remove(region.id);
            }
            if let Some(set) = self.follower_regions.get_mut(&peer.store_id) {
                set.remove(region.id);
            }
            if let Some(set) = self.learner_regions.get_mut(&peer.store_id) {
                set.remove(region.id);
            }
            if let Some(set) = self.pending_regions.get_mut(&peer.store_id) {
                set.remove(region.id);
            }
        }
    }
}

#[derive(Default)]
pub struct ClusterModel {
    inner: RwLock<Inner>,
}

impl ClusterModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn pick_random(
        &self,
        sets: &HashMap<StoreId, PositionSet>,
        regions: &HashMap<RegionId, Region>,
        store: StoreId,
        preds: &[RegionPredicate<'_>],
    ) -> Option<Region> {
        let set = sets.get(&store)?;
        let mut rng = rand::thread_rng();
        for _ in 0..RANDOM_REGION_MAX_RETRY {
            let id = set.random(&mut rng)?;
            if let Some(region) = regions.get(&id) {
                if preds.iter().all(|p| p(region)) {
                    return Some(region.clone());
                }
            }
        }
        None
    }
}

impl ClusterView for ClusterModel {
    fn get_store(&self, id: StoreId) -> Option<Store> {
        self.inner.read().stores.get(&id).cloned()
    }

    fn get_region(&self, id: RegionId) -> Option<Region> {
        self.inner.read().regions.get(&id).cloned()
    }

    fn get_region_by_key(&self, key: &[u8]) -> Option<Region> {
        let inner = self.inner.read();
        let id = inner.tree.search(key)?;
        let region = inner.regions.get(&id)?;
        if region.contains_key(key) {
            Some(region.clone())
        } else {
            None
        }
    }

    fn get_adjacent_regions(&self, region: &Region) -> (Option<Region>, Option<Region>) {
        let inner = self.inner.read();
        let (prev, next) = inner.tree.adjacent(&region.start_key);
        (
            prev.and_then(|id| inner.regions.get(&id).cloned()),
            next.and_then(|id| inner.regions.get(&id).cloned()),
        )
    }

    fn scan_range(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<Region> {
        let inner = self.inner.read();
        inner
            .tree
            .scan(start, end, limit)
            .into_iter()
            .filter_map(|id| inner.regions.get(&id).cloned())
            .collect()
    }

    fn get_overlaps(&self, start: &[u8], end: &[u8]) -> Vec<Region> {
        let inner = self.inner.read();
        inner
            .tree
            .overlap_candidates(start, end)
            .into_iter()
            .filter_map(|id| inner.regions.get(&id).cloned())
            .filter(|r| r.overlaps(start, end))
            .collect()
    }

    fn all_stores(&self) -> Vec<Store> {
        self.inner.read().stores.values().cloned().collect()
    }

    fn get_region_stores(&self, region: &Region) -> Vec<Store> {
        let inner = self.inner.read();
        region.peers.iter().filter_map(|p| inner.stores.get(&p.store_id).cloned()).collect()
    }

    fn get_follower_stores(&self, region: &Region) -> Vec<Store> {
        let inner = self.inner.read();
        region
            .peers
            .iter()
            .filter(|p| matches!(p.role, PeerRole::Voter | PeerRole::IncomingVoter) && !region.is_leader_on(p.store_id))
            .filter_map(|p| inner.stores.get(&p.store_id).cloned())
            .collect()
    }

    fn get_leader_store(&self, region: &Region) -> Option<Store> {
        let leader = region.leader?;
        self.inner.read().stores.get(&leader.store_id).cloned()
    }

    fn rand_leader_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region> {
        let inner = self.inner.read();
        self.pick_random(&inner.leader_regions, &inner.regions, store, preds)
    }

    fn rand_follower_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region> {
        let inner = self.inner.read();
        self.pick_random(&inner.follower_regions, &inner.regions, store, preds)
    }

    fn rand_pending_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region> {
        let inner = self.inner.read();
        self.pick_random(&inner.pending_regions, &inner.regions, store, preds)
    }

    fn rand_learner_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region> {
        let inner = self.inner.read();
        self.pick_random(&inner.learner_regions, &inner.regions, store, preds)
    }

    fn put_store(&self, store: Store) {
        let mut inner = self.inner.write();
        inner.stores.insert(store.id, store);
        let count = inner.stores.len();
        drop(inner);
        pd_telemetry::cluster_metrics().set_store_count(count as i64);
        tracing::info!(store_count = count, "store registered or updated");
    }

    fn put_region(&self, region: Region) -> PutRegionOutcome {
        let mut inner = self.inner.write();

        if let Some(old) = inner.regions.remove(&region.id) {
            inner.deindex_region(&old);
            inner.tree.remove(&old.start_key);
        }

        let mut displaced = Vec::new();
        for id in inner.tree.overlap_candidates(&region.start_key, &region.end_key) {
            if id == region.id {
                continue;
            }
            let Some(old) = inner.regions.get(&id).cloned() else { continue };
            if !old.overlaps(&region.start_key, &region.end_key) {
                continue;
            }
            inner.deindex_region(&old);
            inner.tree.remove(&old.start_key);
            inner.regions.remove(&id);
            displaced.push(old);
        }

        inner.tree.insert(region.start_key.clone(), region.id);
        inner.index_region(&region);
        inner.regions.insert(region.id, region.clone());
        let region_count = inner.regions.len();
        drop(inner);
        pd_telemetry::cluster_metrics().set_region_count(region_count as i64);

        PutRegionOutcome { stored: region, displaced }
    }

    fn remove_region(&self, id: RegionId) -> Option<Region> {
        let mut inner = self.inner.write();
        let region = inner.regions.remove(&id)?;
        inner.deindex_region(&region);
        inner.tree.remove(&region.start_key);
        let region_count = inner.regions.len();
        drop(inner);
        pd_telemetry::cluster_metrics().set_region_count(region_count as i64);
        Some(region)
    }

    fn update_store_status(&self, id: StoreId, f: &mut dyn FnMut(&mut Store)) -> Result<(), ClusterError> {
        let mut inner = self.inner.write();
        let store = inner.stores.get_mut(&id).ok_or(ClusterError::StoreNotFound(id.get()))?;
        f(store);
        Ok(())
    }

    fn store_count(&self) -> usize {
        self.inner.read().stores.len()
    }

    fn region_count(&self) -> usize {
        self.inner.read().regions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::{Peer, PeerId, RegionEpoch};

    fn region(id: u64, start: &[u8], end: &[u8], leader_store: u64) -> Region {
        let mut r = Region::new(RegionId::new(id), start.to_vec(), end.to_vec());
        r.epoch = RegionEpoch::new(1, 1);
        let peer = Peer::new_voter(PeerId::new(id * 10), StoreId::new(leader_store));
        r.leader = Some(peer);
        r.peers = vec![peer];
        r
    }

    #[test]
    fn put_region_indexes_leader_for_random_pick() {
        let model = ClusterModel::new();
        model.put_region(region(1, b"a", b"m", 1));
        let picked = model.rand_leader_region(StoreId::new(1), &[]);
        assert_eq!(picked.map(|r| r.id), Some(RegionId::new(1)));
    }

    #[test]
    fn put_region_displaces_overlapping_regions() {
        let model = ClusterModel::new();
        model.put_region(region(1, b"a", b"m", 1));
        model.put_region(region(2, b"m", b"z", 1));

        let mut merged = region(3, b"a", b"z", 1);
        merged.epoch = RegionEpoch::new(1, 2);
        let outcome = model.put_region(merged);

        assert_eq!(outcome.displaced.len(), 2);
        assert_eq!(model.region_count(), 1);
        assert!(model.get_region(RegionId::new(1)).is_none());
        assert!(model.get_region(RegionId::new(2)).is_none());
    }

    #[test]
    fn remove_region_clears_leader_index() {
        let model = ClusterModel::new();
        model.put_region(region(1, b"a", b"m", 1));
        model.remove_region(RegionId::new(1));
        assert!(model.rand_leader_region(StoreId::new(1), &[]).is_none());
    }

    #[test]
    fn update_store_status_errors_on_unknown_store() {
        let model = ClusterModel::new();
        let result = model.update_store_status(StoreId::new(99), &mut |_| {});
        assert!(result.is_err());
    }

    #[test]
    fn get_region_by_key_respects_half_open_range() {
        let model = ClusterModel::new();
        model.put_region(region(1, b"a", b"m", 1));
        assert!(model.get_region_by_key(b"a").is_some());
        assert!(model.get_region_by_key(b"m").is_none());
    }
}
