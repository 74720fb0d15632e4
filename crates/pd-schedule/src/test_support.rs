//! A minimal in-memory `ClusterView` stub shared by this crate's unit tests.
#![cfg(test)]

use pd_api::cluster::{ClusterError, ClusterView, PutRegionOutcome, RegionPredicate};
use pd_types::ids::{RegionId, StoreId};
use pd_types::region::Region;
use pd_types::store::Store;

#[derive(Default)]
pub struct FakeCluster {
    pub stores: Vec<Store>,
}

impl ClusterView for FakeCluster {
    fn get_store(&self, id: StoreId) -> Option<Store> {
        self.stores.iter().find(|s| s.id == id).cloned()
    }
    fn get_region(&self, _id: RegionId) -> Option<Region> {
        None
    }
    fn get_region_by_key(&self, _key: &[u8]) -> Option<Region> {
        None
    }
    fn get_adjacent_regions(&self, _region: &Region) -> (Option<Region>, Option<Region>) {
        (None, None)
    }
    fn scan_range(&self, _start: &[u8], _end: &[u8], _limit: usize) -> Vec<Region> {
        Vec::new()
    }
    fn get_overlaps(&self, _start: &[u8], _end: &[u8]) -> Vec<Region> {
        Vec::new()
    }
    fn all_stores(&self) -> Vec<Store> {
        self.stores.clone()
    }
    fn get_region_stores(&self, _region: &Region) -> Vec<Store> {
        Vec::new()
    }
    fn get_follower_stores(&self, _region: &Region) -> Vec<Store> {
        Vec::new()
    }
    fn get_leader_store(&self, _region: &Region) -> Option<Store> {
        None
    }
    fn rand_leader_region(&self, _store: StoreId, _preds: &[RegionPredicate<'_>]) -> Option<Region> {
        None
    }
    fn rand_follower_region(&self, _store: StoreId, _preds: &[RegionPredicate<'_>]) -> Option<Region> {
        None
    }
    fn rand_pending_region(&self, _store: StoreId, _preds: &[RegionPredicate<'_>]) -> Option<Region> {
        None
    }
    fn rand_learner_region(&self, _store: StoreId, _preds: &[RegionPredicate<'_>]) -> Option<Region> {
        None
    }
    fn put_store(&self, _store: Store) {}
    fn put_region(&self, region: Region) -> PutRegionOutcome {
        PutRegionOutcome { stored: region, displaced: Vec::new() }
    }
    fn remove_region(&self, _id: RegionId) -> Option<Region> {
        None
    }
    fn update_store_status(&self, _id: StoreId, _f: &mut dyn FnMut(&mut Store)) -> Result<(), ClusterError> {
        Ok(())
    }
    fn store_count(&self) -> usize {
        self.stores.len()
    }
    fn region_count(&self) -> usize {
        0
    }
}

pub fn up_store(id: u64) -> Store {
    let mut s = Store::new(StoreId::new(id), format!("127.0.0.1:{id}"));
    s.capacity_bytes = 100;
    s.observe_available(100);
    s
}
