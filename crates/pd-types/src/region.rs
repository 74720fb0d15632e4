//! A contiguous key-range replicated by a consensus group (spec.md §3 "Region").

use crate::epoch::RegionEpoch;
use crate::ids::{PeerId, RegionId, StoreId};
use crate::peer::{Peer, PeerRole};
use serde::{Deserialize, Serialize};

/// A peer observed down on a region heartbeat, with how long it has been
/// unresponsive as reported by the peer's own store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownPeer {
    pub peer: Peer,
    pub down_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    /// Inclusive start of the half-open key range.
    pub start_key: Vec<u8>,
    /// Exclusive end of the half-open key range; empty means "to infinity".
    pub end_key: Vec<u8>,
    pub epoch: RegionEpoch,
    pub peers: Vec<Peer>,
    pub leader: Option<Peer>,
    pub down_peers: Vec<DownPeer>,
    pub pending_peers: Vec<Peer>,

    pub approximate_size: u64,
    pub approximate_keys: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub keys_written: u64,
    pub keys_read: u64,
}

impl Region {
    pub fn new(id: RegionId, start_key: Vec<u8>, end_key: Vec<u8>) -> Self {
        Self {
            id,
            start_key,
            end_key,
            epoch: RegionEpoch::default(),
            peers: Vec::new(),
            leader: None,
            down_peers: Vec::new(),
            pending_peers: Vec::new(),
            approximate_size: 0,
            approximate_keys: 0,
            bytes_written: 0,
            bytes_read: 0,
            keys_written: 0,
            keys_read: 0,
        }
    }

    /// Half-open range contains `key`, honoring the "empty end == infinity"
    /// convention from spec.md §3.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice()
            && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }

    /// True if `self`'s range and `other`'s range intersect.
    pub fn overlaps(&self, other_start: &[u8], other_end: &[u8]) -> bool {
        let starts_before_other_ends = other_end.is_empty() || self.start_key.as_slice() < other_end;
        let ends_after_other_starts = self.end_key.is_empty() || self.end_key.as_slice() > other_start;
        starts_before_other_ends && ends_after_other_starts
    }

    pub fn voters(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| matches!(p.role, PeerRole::Voter | PeerRole::IncomingVoter | PeerRole::DemotingVoter))
    }

    pub fn learners(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.role.is_learner())
    }

    pub fn voter_count(&self) -> usize {
        self.voters().count()
    }

    pub fn peer_on_store(&self, store_id: StoreId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }

    pub fn peer_by_id(&self, peer_id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == peer_id)
    }

    pub fn is_leader_on(&self, store_id: StoreId) -> bool {
        self.leader.map(|p| p.store_id == store_id).unwrap_or(false)
    }

    pub fn is_pending(&self, peer_id: PeerId) -> bool {
        self.pending_peers.iter().any(|p| p.id == peer_id)
    }

    pub fn is_down(&self, peer_id: PeerId) -> bool {
        self.down_peers.iter().any(|d| d.peer.id == peer_id)
    }

    pub fn down_seconds_of(&self, peer_id: PeerId) -> Option<u64> {
        self.down_peers.iter().find(|d| d.peer.id == peer_id).map(|d| d.down_seconds)
    }

    pub fn has_any_joint_state_peer(&self) -> bool {
        self.peers.iter().any(|p| p.role.is_in_joint_state())
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    /// "Just loaded, awaiting first heartbeat" per spec.md §4.F's shared
    /// checker precondition.
    pub fn is_freshly_loaded(&self) -> bool {
        self.approximate_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: &[u8], end: &[u8]) -> Region {
        Region::new(RegionId(1), start.to_vec(), end.to_vec())
    }

    #[test]
    fn infinite_end_contains_everything_after_start() {
        let region = r(b"m", b"");
        assert!(region.contains_key(b"z"));
        assert!(!region.contains_key(b"a"));
    }

    #[test]
    fn half_open_range_excludes_end() {
        let region = r(b"a", b"m");
        assert!(region.contains_key(b"a"));
        assert!(!region.contains_key(b"m"));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let a = r(b"a", b"m");
        assert!(!a.overlaps(b"m", b"z"));
        assert!(a.overlaps(b"l", b"z"));
    }
}
