//! A single replica of a region on a store (spec.md §3 "Peer").

use crate::ids::{PeerId, StoreId};
use serde::{Deserialize, Serialize};

/// `IncomingVoter` and `DemotingVoter` together constitute "joint state": an
/// intermediate configuration during a membership change compiled in
/// joint-consensus mode (spec.md §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    Voter,
    Learner,
    IncomingVoter,
    DemotingVoter,
}

impl PeerRole {
    pub fn is_learner(self) -> bool {
        matches!(self, PeerRole::Learner)
    }

    /// True for `IncomingVoter` / `DemotingVoter` — peers that exist only
    /// mid-way through a joint-consensus membership change.
    pub fn is_in_joint_state(self) -> bool {
        matches!(self, PeerRole::IncomingVoter | PeerRole::DemotingVoter)
    }

    /// A `Learner` or a `DemotingVoter` can never be a legal leader
    /// (spec.md §4.E "Safety rules").
    pub fn can_be_leader(self) -> bool {
        matches!(self, PeerRole::Voter | PeerRole::IncomingVoter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub store_id: StoreId,
    pub role: PeerRole,
}

impl Peer {
    pub fn new_voter(id: PeerId, store_id: StoreId) -> Self {
        Self { id, store_id, role: PeerRole::Voter }
    }

    pub fn new_learner(id: PeerId, store_id: StoreId) -> Self {
        Self { id, store_id, role: PeerRole::Learner }
    }
}
