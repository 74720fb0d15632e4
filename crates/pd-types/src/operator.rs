//! The operator model: steps, finish predicates, and the operator state
//! machine (spec.md §3 "Operator", §4.D).

use crate::ids::{PeerId, RegionId, StoreId};
use crate::peer::Peer;
use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// One entry in a joint-consensus `ChangePeerV2Enter` step (spec.md §4.E).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointChange {
    AddVoter(Peer),
    AddLearner(Peer),
    Promote(PeerId),
    Demote(PeerId),
    Remove(PeerId),
}

/// An atomic transformation with a finish predicate (spec.md §3 "Step",
/// §4.D table). Light variants behave identically for finish-checking
/// purposes; they only differ in the priority the controller gives their
/// dispatch (spec.md does not require a distinct predicate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorStep {
    TransferLeader { from: StoreId, to: StoreId },
    AddPeer { to_store: StoreId, peer_id: PeerId, light: bool },
    AddLearner { to_store: StoreId, peer_id: PeerId, light: bool },
    PromoteLearner { to_store: StoreId, peer_id: PeerId },
    DemoteFollower { to_store: StoreId, peer_id: PeerId },
    RemovePeer { from_store: StoreId },
    /// `target_union_range` is the range the *active* side's region must
    /// come to cover once the merge is observably complete.
    MergeRegion {
        source: RegionId,
        target: RegionId,
        is_passive: bool,
        target_union_start: Vec<u8>,
        target_union_end: Vec<u8>,
    },
    SplitRegion { original_start: Vec<u8>, original_end: Vec<u8> },
    ChangePeerV2Enter { changes: Vec<JointChange> },
    ChangePeerV2Leave,
}

impl OperatorStep {
    /// Evaluates the step's finish predicate against the latest observed
    /// region snapshot. `None` means the region id no longer exists in the
    /// cluster model — this is only a valid "finished" signal for the
    /// passive side of a merge (spec.md §4.H dispatch-loop note: a gone
    /// region is "a split/merge absorbed it").
    pub fn is_finished(&self, observed: Option<&Region>) -> bool {
        match self {
            OperatorStep::TransferLeader { to, .. } => {
                observed.and_then(|r| r.leader).map(|l| l.store_id == *to).unwrap_or(false)
            }
            OperatorStep::AddPeer { to_store, peer_id, .. } => observed
                .and_then(|r| r.peer_by_id(*peer_id))
                .map(|p| p.store_id == *to_store && !observed.map(|r| r.is_pending(*peer_id)).unwrap_or(false))
                .unwrap_or(false),
            OperatorStep::AddLearner { to_store, peer_id, .. } => observed
                .and_then(|r| r.peer_by_id(*peer_id))
                .map(|p| {
                    p.store_id == *to_store
                        && p.role.is_learner()
                        && !observed.map(|r| r.is_pending(*peer_id)).unwrap_or(false)
                })
                .unwrap_or(false),
            OperatorStep::PromoteLearner { peer_id, .. } => observed
                .and_then(|r| r.peer_by_id(*peer_id))
                .map(|p| !p.role.is_learner())
                .unwrap_or(false),
            OperatorStep::DemoteFollower { peer_id, .. } => observed
                .and_then(|r| r.peer_by_id(*peer_id))
                .map(|p| p.role.is_learner())
                .unwrap_or(false),
            OperatorStep::RemovePeer { from_store } => {
                observed.map(|r| r.peer_on_store(*from_store).is_none()).unwrap_or(true)
            }
            OperatorStep::MergeRegion { is_passive, target_union_start, target_union_end, .. } => {
                if *is_passive {
                    observed.is_none()
                } else {
                    observed
                        .map(|r| region_covers(r, target_union_start, target_union_end))
                        .unwrap_or(false)
                }
            }
            OperatorStep::SplitRegion { original_start, original_end } => observed
                .map(|r| r.start_key != *original_start || r.end_key != *original_end)
                .unwrap_or(false),
            OperatorStep::ChangePeerV2Enter { changes } => observed
                .map(|r| changes.iter().all(|c| joint_enter_reflected(r, c)))
                .unwrap_or(false),
            OperatorStep::ChangePeerV2Leave => {
                observed.map(|r| !r.has_any_joint_state_peer()).unwrap_or(false)
            }
        }
    }

    /// Whether this step is a leader-only action for timeout-classification
    /// purposes (spec.md §4.D: leader-only operators use the 10s timeout).
    pub fn is_leader_only(&self) -> bool {
        matches!(self, OperatorStep::TransferLeader { .. })
    }
}

fn region_covers(region: &Region, start: &[u8], end: &[u8]) -> bool {
    region.start_key.as_slice() <= start
        && (region.end_key.is_empty() || (!end.is_empty() && region.end_key.as_slice() >= end))
}

fn joint_enter_reflected(region: &Region, change: &JointChange) -> bool {
    match change {
        JointChange::AddVoter(p) | JointChange::AddLearner(p) => {
            region.peer_on_store(p.store_id).is_some()
        }
        JointChange::Promote(id) => region
            .peer_by_id(*id)
            .map(|p| matches!(p.role, crate::peer::PeerRole::IncomingVoter | crate::peer::PeerRole::Voter))
            .unwrap_or(false),
        JointChange::Demote(id) => region
            .peer_by_id(*id)
            .map(|p| matches!(p.role, crate::peer::PeerRole::DemotingVoter | crate::peer::PeerRole::Learner))
            .unwrap_or(false),
        JointChange::Remove(id) => region.peer_by_id(*id).is_none(),
    }
}

/// Operator kind flags (spec.md §3). Stored as bitflags so an operator can
/// carry more than one, e.g. a replica-repair operator is `Region | Replica`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorKind(u8);

impl OperatorKind {
    pub const LEADER: OperatorKind = OperatorKind(1 << 0);
    pub const REGION: OperatorKind = OperatorKind(1 << 1);
    pub const ADMIN: OperatorKind = OperatorKind(1 << 2);
    pub const REPLICA: OperatorKind = OperatorKind(1 << 3);
    pub const BALANCE: OperatorKind = OperatorKind(1 << 4);
    pub const MERGE: OperatorKind = OperatorKind(1 << 5);
    pub const SPLIT: OperatorKind = OperatorKind(1 << 6);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: OperatorKind) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: OperatorKind) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for OperatorKind {
    type Output = OperatorKind;
    fn bitor(self, rhs: OperatorKind) -> OperatorKind {
        self.union(rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorPriority {
    Low,
    Normal,
    High,
}

/// Terminal states are one-way; the status slot is a `u8` behind an atomic
/// so `OperatorStatus::terminalize` can compare-and-swap it without a lock
/// (spec.md §3 invariant: "transition to any terminal status is one-way and
/// atomic").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperatorStatus {
    Created = 0,
    Started = 1,
    Success = 2,
    Timeout = 3,
    Cancelled = 4,
    Replaced = 5,
    Expired = 6,
}

impl OperatorStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperatorStatus::Created | OperatorStatus::Started)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => OperatorStatus::Created,
            1 => OperatorStatus::Started,
            2 => OperatorStatus::Success,
            3 => OperatorStatus::Timeout,
            4 => OperatorStatus::Cancelled,
            5 => OperatorStatus::Replaced,
            _ => OperatorStatus::Expired,
        }
    }
}

/// Atomic status cell backing [`Operator::status`].
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub fn new(initial: OperatorStatus) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> OperatorStatus {
        OperatorStatus::from_u8(self.0.load(AtomicOrdering::Acquire))
    }

    /// Transitions to `next` unless the current status is already terminal.
    /// Returns `true` if this call performed the transition.
    pub fn terminalize(&self, next: OperatorStatus) -> bool {
        debug_assert!(next.is_terminal());
        loop {
            let current = self.0.load(AtomicOrdering::Acquire);
            if OperatorStatus::from_u8(current).is_terminal() {
                return false;
            }
            if self
                .0
                .compare_exchange(current, next as u8, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// `Created -> Started`, a non-terminal transition so it uses a plain
    /// store guarded by the expected prior value.
    pub fn start(&self) -> bool {
        self.0
            .compare_exchange(
                OperatorStatus::Created as u8,
                OperatorStatus::Started as u8,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_ok()
    }
}

impl Clone for AtomicStatus {
    fn clone(&self) -> Self {
        AtomicStatus::new(self.load())
    }
}

/// Leader-only operators time out after 10s; region-moving operators after
/// 10 minutes; an operator that never starts expires after 3s (spec.md §4.D).
pub const LEADER_OPERATOR_TIMEOUT: Duration = Duration::from_secs(10);
pub const REGION_OPERATOR_TIMEOUT: Duration = Duration::from_secs(600);
pub const UNSTARTED_OPERATOR_EXPIRY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct Operator {
    pub description: String,
    pub region_id: RegionId,
    /// The region epoch captured when this operator was built; the
    /// controller cancels the operator as stale if the live epoch ever
    /// diverges (spec.md §4.H `Dispatch`).
    pub region_epoch: crate::epoch::RegionEpoch,
    pub kind: OperatorKind,
    pub steps: Vec<OperatorStep>,
    pub step_index: usize,
    pub status: AtomicStatus,
    pub priority: OperatorPriority,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub last_step_at: Option<SystemTime>,
}

impl Operator {
    pub fn new(
        description: impl Into<String>,
        region_id: RegionId,
        region_epoch: crate::epoch::RegionEpoch,
        kind: OperatorKind,
        steps: Vec<OperatorStep>,
        priority: OperatorPriority,
    ) -> Self {
        Self {
            description: description.into(),
            region_id,
            region_epoch,
            kind,
            steps,
            step_index: 0,
            status: AtomicStatus::new(OperatorStatus::Created),
            priority,
            created_at: SystemTime::now(),
            started_at: None,
            last_step_at: None,
        }
    }

    pub fn current_step(&self) -> Option<&OperatorStep> {
        self.steps.get(self.step_index)
    }

    pub fn is_finished(&self) -> bool {
        self.step_index >= self.steps.len()
    }

    /// The step-type-specific wait window for the step currently pending
    /// (spec.md §4.D).
    pub fn step_timeout(&self) -> Duration {
        if self.kind.contains(OperatorKind::REGION) {
            REGION_OPERATOR_TIMEOUT
        } else {
            LEADER_OPERATOR_TIMEOUT
        }
    }

    pub fn start(&mut self) -> bool {
        if self.status.start() {
            self.started_at = Some(SystemTime::now());
            self.last_step_at = self.started_at;
            true
        } else {
            false
        }
    }

    /// Advances past the current step if its finish predicate now holds
    /// against `observed`. Returns the step that is pending after this call
    /// (`None` if the operator is now finished).
    pub fn advance(&mut self, observed: Option<&Region>) -> Option<&OperatorStep> {
        while let Some(step) = self.steps.get(self.step_index) {
            if step.is_finished(observed) {
                self.step_index += 1;
                self.last_step_at = Some(SystemTime::now());
            } else {
                break;
            }
        }
        if self.is_finished() {
            self.status.terminalize(OperatorStatus::Success);
            None
        } else {
            self.current_step()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerRole;

    #[test]
    fn terminal_status_is_one_way() {
        let s = AtomicStatus::new(OperatorStatus::Started);
        assert!(s.terminalize(OperatorStatus::Timeout));
        assert_eq!(s.load(), OperatorStatus::Timeout);
        assert!(!s.terminalize(OperatorStatus::Cancelled));
        assert_eq!(s.load(), OperatorStatus::Timeout);
    }

    #[test]
    fn transfer_leader_finishes_when_leader_moves() {
        let mut region = Region::new(RegionId(1), b"a".to_vec(), b"z".to_vec());
        region.peers.push(Peer::new_voter(PeerId(1), StoreId(1)));
        region.peers.push(Peer::new_voter(PeerId(2), StoreId(2)));
        region.leader = Some(Peer::new_voter(PeerId(1), StoreId(1)));

        let step = OperatorStep::TransferLeader { from: StoreId(1), to: StoreId(2) };
        assert!(!step.is_finished(Some(&region)));
        region.leader = Some(Peer::new_voter(PeerId(2), StoreId(2)));
        assert!(step.is_finished(Some(&region)));
    }

    #[test]
    fn remove_peer_finishes_when_gone() {
        let mut region = Region::new(RegionId(1), b"a".to_vec(), b"z".to_vec());
        region.peers.push(Peer::new_voter(PeerId(1), StoreId(3)));
        let step = OperatorStep::RemovePeer { from_store: StoreId(3) };
        assert!(!step.is_finished(Some(&region)));
        region.peers.clear();
        assert!(step.is_finished(Some(&region)));
    }

    #[test]
    fn passive_merge_finishes_when_region_absorbed() {
        let step = OperatorStep::MergeRegion {
            source: RegionId(1),
            target: RegionId(2),
            is_passive: true,
            target_union_start: b"a".to_vec(),
            target_union_end: b"z".to_vec(),
        };
        assert!(!step.is_finished(Some(&Region::new(RegionId(1), b"a".to_vec(), b"m".to_vec()))));
        assert!(step.is_finished(None));
    }

    #[test]
    fn advance_stops_at_first_unfinished_step() {
        let mut region = Region::new(RegionId(7), b"a".to_vec(), b"z".to_vec());
        region.peers.push(Peer::new_voter(PeerId(1), StoreId(1)));
        region.leader = Some(Peer::new_voter(PeerId(1), StoreId(1)));

        let mut op = Operator::new(
            "test",
            RegionId(7),
            crate::epoch::RegionEpoch::new(1, 1),
            OperatorKind::REPLICA,
            vec![
                OperatorStep::AddLearner { to_store: StoreId(2), peer_id: PeerId(2), light: false },
                OperatorStep::PromoteLearner { to_store: StoreId(2), peer_id: PeerId(2) },
            ],
            OperatorPriority::Normal,
        );
        op.start();
        assert_eq!(op.advance(Some(&region)), Some(&op.steps[0]));

        region.peers.push(Peer::new_learner(PeerId(2), StoreId(2)));
        let next = op.advance(Some(&region)).cloned();
        assert_eq!(next, Some(OperatorStep::PromoteLearner { to_store: StoreId(2), peer_id: PeerId(2) }));

        region.peers[1].role = PeerRole::Voter;
        assert_eq!(op.advance(Some(&region)), None);
        assert!(op.is_finished());
    }
}
