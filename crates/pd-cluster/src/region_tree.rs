//! An ordered map keyed by region start-key (spec.md §3 "Region tree"):
//! point lookup by key, predecessor/successor lookup, and range scan, used
//! to detect overlap on heartbeat and find merge candidates.

use pd_types::RegionId;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct RegionTree {
    by_start_key: BTreeMap<Vec<u8>, RegionId>,
}

impl RegionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, start_key: Vec<u8>, id: RegionId) {
        self.by_start_key.insert(start_key, id);
    }

    pub fn remove(&mut self, start_key: &[u8]) {
        self.by_start_key.remove(start_key);
    }

    /// The region whose start-key is the greatest key `<= key`; the caller
    /// still must confirm `key` falls inside that region's range, since the
    /// tree alone only knows where ranges begin.
    pub fn search(&self, key: &[u8]) -> Option<RegionId> {
        self.by_start_key.range(..=key.to_vec()).next_back().map(|(_, id)| *id)
    }

    /// (predecessor, successor) around `start_key` in start-key order.
    pub fn adjacent(&self, start_key: &[u8]) -> (Option<RegionId>, Option<RegionId>) {
        let prev = self.by_start_key.range(..start_key.to_vec()).next_back().map(|(_, id)| *id);
        let next = self.by_start_key.range(start_key.to_vec()..).nth(1).map(|(_, id)| *id);
        (prev, next)
    }

    /// Every region id whose range could overlap `[start, end)`: the
    /// predecessor of `start` (which may extend into the range) plus every
    /// region starting within `[start, end)`.
    pub fn overlap_candidates(&self, start: &[u8], end: &[u8]) -> Vec<RegionId> {
        let mut ids = Vec::new();
        if let Some((_, id)) = self.by_start_key.range(..=start.to_vec()).next_back() {
            ids.push(*id);
        }
        let forward = self.by_start_key.range(start.to_vec()..);
        for (key, id) in forward {
            if !end.is_empty() && key.as_slice() >= end {
                break;
            }
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    /// Region ids with start-key in `[start, end)`, in order, capped at
    /// `limit` (0 means unbounded).
    pub fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<RegionId> {
        let mut ids = Vec::new();
        let iter = self.by_start_key.range(start.to_vec()..);
        for (key, id) in iter {
            if !end.is_empty() && key.as_slice() >= end {
                break;
            }
            ids.push(*id);
            if limit != 0 && ids.len() >= limit {
                break;
            }
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.by_start_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u64]) -> Vec<RegionId> {
        v.iter().map(|x| RegionId::new(*x)).collect()
    }

    #[test]
    fn search_finds_predecessor_region() {
        let mut tree = RegionTree::new();
        tree.insert(b"a".to_vec(), RegionId::new(1));
        tree.insert(b"m".to_vec(), RegionId::new(2));
        assert_eq!(tree.search(b"b"), Some(RegionId::new(1)));
        assert_eq!(tree.search(b"n"), Some(RegionId::new(2)));
    }

    #[test]
    fn overlap_candidates_includes_predecessor_spanning_in() {
        let mut tree = RegionTree::new();
        tree.insert(b"a".to_vec(), RegionId::new(1));
        tree.insert(b"m".to_vec(), RegionId::new(2));
        tree.insert(b"z".to_vec(), RegionId::new(3));

        let candidates = tree.overlap_candidates(b"k", b"p");
        assert_eq!(candidates, ids(&[1, 2]));
    }

    #[test]
    fn adjacent_returns_neighbours_in_start_key_order() {
        let mut tree = RegionTree::new();
        tree.insert(b"a".to_vec(), RegionId::new(1));
        tree.insert(b"m".to_vec(), RegionId::new(2));
        tree.insert(b"z".to_vec(), RegionId::new(3));

        assert_eq!(tree.adjacent(b"m"), (Some(RegionId::new(1)), Some(RegionId::new(3))));
    }
}
