//! A set that supports O(1) insert/remove/contains and uniform random pick,
//! backed by a dense `Vec` plus a position index (spec.md §4.A: random
//! leader/follower/pending/learner region selection per store).

use pd_types::RegionId;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PositionSet {
    items: Vec<RegionId>,
    index: HashMap<RegionId, usize>,
}

impl PositionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: RegionId) {
        if self.index.contains_key(&id) {
            return;
        }
        self.index.insert(id, self.items.len());
        self.items.push(id);
    }

    /// Swap-remove: move the last element into the removed slot so removal
    /// stays O(1) instead of shifting the tail.
    pub fn remove(&mut self, id: RegionId) {
        if let Some(&pos) = self.index.get(&id) {
            let last = self.items.len() - 1;
            self.items.swap(pos, last);
            self.items.pop();
            self.index.remove(&id);
            if pos < self.items.len() {
                self.index.insert(self.items[pos], pos);
            }
        }
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn random(&self, rng: &mut impl Rng) -> Option<RegionId> {
        if self.items.is_empty() {
            None
        } else {
            let idx = rng.gen_range(0..self.items.len());
            Some(self.items[idx])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.items.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_keeps_remaining_members_reachable() {
        let mut set = PositionSet::new();
        for i in 1..=5 {
            set.insert(RegionId::new(i));
        }
        set.remove(RegionId::new(3));
        assert_eq!(set.len(), 4);
        assert!(!set.contains(RegionId::new(3)));
        for i in [1, 2, 4, 5] {
            assert!(set.contains(RegionId::new(i)));
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = PositionSet::new();
        set.insert(RegionId::new(1));
        set.insert(RegionId::new(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn random_pick_returns_member_of_set() {
        let mut set = PositionSet::new();
        set.insert(RegionId::new(7));
        set.insert(RegionId::new(8));
        let mut rng = rand::thread_rng();
        let pick = set.random(&mut rng).expect("non-empty set yields a pick");
        assert!(pick == RegionId::new(7) || pick == RegionId::new(8));
    }
}
