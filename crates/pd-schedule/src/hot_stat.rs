//! Hot-region flow tracking (spec.md §4.G "Hot-region balance"): three
//! independent store-id -> (total flow bytes, region list) tables —
//! `readStatAsLeader`, `writeStatAsPeer`, `writeStatAsLeader` — fed from
//! region heartbeats and consulted by the merge checker and the hot-region
//! scheduler.

use parking_lot::RwLock;
use pd_types::ids::{RegionId, StoreId};
use pd_types::region::Region;
use std::collections::HashMap;

/// Bytes/heartbeat-interval above which a region counts as hot. The teacher
/// heartbeat cadence is 10s (spec.md §4.C), so this is roughly 100KB/s.
pub const HOT_REGION_BYTE_THRESHOLD: u64 = 1024 * 1024;

#[derive(Debug, Default, Clone)]
struct FlowTable {
    total_bytes: HashMap<StoreId, u64>,
    regions: HashMap<StoreId, Vec<RegionId>>,
}

impl FlowTable {
    fn record(&mut self, store: StoreId, region: RegionId, bytes: u64) {
        if bytes < HOT_REGION_BYTE_THRESHOLD {
            self.forget(store, region);
            return;
        }
        *self.total_bytes.entry(store).or_insert(0) += bytes;
        let list = self.regions.entry(store).or_default();
        if !list.contains(&region) {
            list.push(region);
        }
    }

    fn forget(&mut self, store: StoreId, region: RegionId) {
        if let Some(list) = self.regions.get_mut(&store) {
            list.retain(|r| *r != region);
        }
    }

    fn hot_count(&self, store: StoreId) -> usize {
        self.regions.get(&store).map(Vec::len).unwrap_or(0)
    }

    fn total_bytes(&self, store: StoreId) -> u64 {
        self.total_bytes.get(&store).copied().unwrap_or(0)
    }

    fn is_hot(&self, region: RegionId) -> bool {
        self.regions.values().any(|list| list.contains(&region))
    }

    fn hot_regions_of(&self, store: StoreId) -> Vec<RegionId> {
        self.regions.get(&store).cloned().unwrap_or_default()
    }
}

/// Read queries a leader answers and write volume replicated to each of a
/// region's peer stores, split from writes specifically applied while
/// acting as leader (the hot-region scheduler balances these differently:
/// read flow moves by transferring leadership, write-as-peer flow moves the
/// peer itself).
#[derive(Debug, Default)]
struct Inner {
    read_as_leader: FlowTable,
    write_as_peer: FlowTable,
    write_as_leader: FlowTable,
}

#[derive(Debug, Default)]
pub struct HotRegionStats {
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotFlowKind {
    Read,
    Write,
}

impl HotRegionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in one region's latest reported flow. `bytes_read`/`bytes_written`
    /// are the per-heartbeat deltas already computed by the caller.
    pub fn observe(&self, region: &Region) {
        let mut inner = self.inner.write();
        if let Some(leader) = region.leader {
            inner.read_as_leader.record(leader.store_id, region.id, region.bytes_read);
            inner.write_as_leader.record(leader.store_id, region.id, region.bytes_written);
        }
        for peer in &region.peers {
            inner.write_as_peer.record(peer.store_id, region.id, region.bytes_written);
        }
    }

    pub fn is_hot(&self, region: RegionId) -> bool {
        let inner = self.inner.read();
        inner.read_as_leader.is_hot(region) || inner.write_as_peer.is_hot(region) || inner.write_as_leader.is_hot(region)
    }

    /// The store with the most hot regions for `kind`, ties broken by total
    /// bytes (spec.md §4.G "breaking ties by bytes").
    pub fn busiest_store(&self, kind: HotFlowKind) -> Option<StoreId> {
        let inner = self.inner.read();
        let table = match kind {
            HotFlowKind::Read => &inner.read_as_leader,
            HotFlowKind::Write => &inner.write_as_peer,
        };
        table
            .regions
            .keys()
            .copied()
            .max_by_key(|s| (table.hot_count(*s), table.total_bytes(*s)))
    }

    pub fn hot_regions_of(&self, store: StoreId, kind: HotFlowKind) -> Vec<RegionId> {
        let inner = self.inner.read();
        match kind {
            HotFlowKind::Read => inner.read_as_leader.hot_regions_of(store),
            HotFlowKind::Write => inner.write_as_peer.hot_regions_of(store),
        }
    }

    pub fn hot_count(&self, store: StoreId, kind: HotFlowKind) -> usize {
        let inner = self.inner.read();
        match kind {
            HotFlowKind::Read => inner.read_as_leader.hot_count(store),
            HotFlowKind::Write => inner.write_as_peer.hot_count(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::ids::PeerId;
    use pd_types::peer::Peer;

    fn region_with_flow(id: u64, leader_store: u64, bytes: u64) -> Region {
        let mut r = Region::new(RegionId::new(id), b"a".to_vec(), b"z".to_vec());
        r.peers = vec![Peer::new_voter(PeerId::new(1), StoreId::new(leader_store))];
        r.leader = Some(Peer::new_voter(PeerId::new(1), StoreId::new(leader_store)));
        r.bytes_read = bytes;
        r.bytes_written = bytes;
        r
    }

    #[test]
    fn region_above_threshold_is_hot() {
        let stats = HotRegionStats::new();
        stats.observe(&region_with_flow(1, 1, HOT_REGION_BYTE_THRESHOLD + 1));
        assert!(stats.is_hot(RegionId::new(1)));
    }

    #[test]
    fn region_below_threshold_is_not_hot() {
        let stats = HotRegionStats::new();
        stats.observe(&region_with_flow(1, 1, 10));
        assert!(!stats.is_hot(RegionId::new(1)));
    }

    #[test]
    fn busiest_store_breaks_ties_by_bytes() {
        let stats = HotRegionStats::new();
        stats.observe(&region_with_flow(1, 1, HOT_REGION_BYTE_THRESHOLD + 10));
        stats.observe(&region_with_flow(2, 2, HOT_REGION_BYTE_THRESHOLD + 1000));
        assert_eq!(stats.busiest_store(HotFlowKind::Read), Some(StoreId::new(2)));
    }
}
