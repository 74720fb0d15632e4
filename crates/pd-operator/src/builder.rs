//! Diffs a region's current peer placement against a desired one and
//! compiles the membership-change operator (spec.md §4.E).

use pd_types::epoch::RegionEpoch;
use pd_types::operator::{JointChange, Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::peer::{Peer, PeerRole};
use pd_types::region::Region;
use pd_types::ids::{PeerId, StoreId};
use std::collections::BTreeMap;
use thiserror::Error;

/// The role a store is meant to hold once the build completes. Only the two
/// stable end-states are expressible here; `IncomingVoter`/`DemotingVoter`
/// are compile-time artifacts the builder introduces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredRole {
    Voter,
    Learner,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("region has no leader")]
    NoLeader,
    #[error("placement rule violation: {0}")]
    PlacementRuleViolation(String),
    #[error("store {0} cannot legally become leader")]
    IllegalLeader(u64),
    #[error("no operator step is built")]
    NoStep,
}

impl pd_types::error::ErrorCode for BuildError {
    fn code(&self) -> &'static str {
        match self {
            BuildError::NoLeader => "OPERATOR_BUILD_NO_LEADER",
            BuildError::PlacementRuleViolation(_) => "OPERATOR_BUILD_PLACEMENT_RULE_VIOLATION",
            BuildError::IllegalLeader(_) => "OPERATOR_BUILD_ILLEGAL_LEADER",
            BuildError::NoStep => "OPERATOR_BUILD_NO_STEP",
        }
    }
}

struct Diff {
    to_add: Vec<(StoreId, DesiredRole)>,
    to_remove: Vec<StoreId>,
    to_promote: Vec<StoreId>,
    to_demote: Vec<StoreId>,
}

fn diff(region: &Region, target: &BTreeMap<StoreId, DesiredRole>) -> Diff {
    let mut to_add = Vec::new();
    let mut to_remove = Vec::new();
    let mut to_promote = Vec::new();
    let mut to_demote = Vec::new();

    for (store, role) in target {
        match region.peer_on_store(*store) {
            None => to_add.push((*store, *role)),
            Some(peer) => {
                let currently_learner = peer.role.is_learner();
                match (currently_learner, role) {
                    (true, DesiredRole::Voter) => to_promote.push(*store),
                    (false, DesiredRole::Learner) => to_demote.push(*store),
                    _ => {}
                }
            }
        }
    }
    for peer in &region.peers {
        if !target.contains_key(&peer.store_id) {
            to_remove.push(peer.store_id);
        }
    }
    Diff { to_add, to_remove, to_promote, to_demote }
}

/// Scores a candidate interim-leader store while a replacement is underway:
/// an `Up` store avoids snapshot traffic, and among `Up` stores the voter
/// added earliest is preferred (new peers may reject leadership).
fn interim_leader_candidate<'a>(region: &'a Region, exclude: StoreId) -> Option<StoreId> {
    region
        .voters()
        .filter(|p| p.store_id != exclude && p.role.can_be_leader())
        .map(|p| p.store_id)
        .next()
}

/// Builds the operator moving `region` toward `target`, using joint
/// consensus when the caller reports the cluster supports it and a
/// sequential one-replacement-at-a-time plan otherwise.
pub fn build(
    region: &Region,
    target: &BTreeMap<StoreId, DesiredRole>,
    target_leader: Option<StoreId>,
    joint_consensus_enabled: bool,
    priority: OperatorPriority,
    description: impl Into<String>,
    alloc_peer_id: &mut dyn FnMut() -> PeerId,
) -> Result<Operator, BuildError> {
    let leader = region.leader.ok_or(BuildError::NoLeader)?;

    if let Some(target_store) = target_leader {
        if let Some(role) = target.get(&target_store) {
            if *role != DesiredRole::Voter {
                return Err(BuildError::IllegalLeader(target_store.get()));
            }
        } else if region.peer_on_store(target_store).map(|p| !p.role.can_be_leader()).unwrap_or(true) {
            return Err(BuildError::IllegalLeader(target_store.get()));
        }
    }

    let d = diff(region, target);
    let mut steps = Vec::new();

    if joint_consensus_enabled {
        build_joint(region, &d, leader, target_leader, alloc_peer_id, &mut steps);
    } else {
        build_sequential(region, &d, leader, target_leader, alloc_peer_id, &mut steps);
    }

    if steps.is_empty() {
        return Err(BuildError::NoStep);
    }

    let mut kind = OperatorKind::REGION | OperatorKind::REPLICA;
    if steps.iter().any(|s| s.is_leader_only()) {
        kind = kind | OperatorKind::LEADER;
    }

    Ok(Operator::new(description, region.id, region.epoch, kind, steps, priority))
}

fn build_joint(
    region: &Region,
    d: &Diff,
    leader: Peer,
    target_leader: Option<StoreId>,
    alloc_peer_id: &mut dyn FnMut() -> PeerId,
    steps: &mut Vec<OperatorStep>,
) {
    let mut changes = Vec::new();

    for (store, role) in &d.to_add {
        let peer_id = alloc_peer_id();
        let peer = Peer { id: peer_id, store_id: *store, role: PeerRole::Voter };
        changes.push(match role {
            DesiredRole::Voter => JointChange::AddVoter(peer),
            DesiredRole::Learner => JointChange::AddLearner(peer),
        });
    }
    for store in &d.to_promote {
        if let Some(p) = region.peer_on_store(*store) {
            changes.push(JointChange::Promote(p.id));
        }
    }
    for store in &d.to_demote {
        if let Some(p) = region.peer_on_store(*store) {
            changes.push(JointChange::Demote(p.id));
        }
    }

    // A peer being removed or demoted can never be the leader at commit
    // time, so move leadership off it first.
    let leaving: Vec<StoreId> = d.to_remove.iter().chain(d.to_demote.iter()).copied().collect();
    if leaving.contains(&leader.store_id) {
        if let Some(interim) = interim_leader_candidate(region, leader.store_id) {
            steps.push(OperatorStep::TransferLeader { from: leader.store_id, to: interim });
        }
    }

    if !changes.is_empty() {
        steps.push(OperatorStep::ChangePeerV2Enter { changes });
        steps.push(OperatorStep::ChangePeerV2Leave);
    }

    for store in &d.to_remove {
        steps.push(OperatorStep::RemovePeer { from_store: *store });
    }

    if let Some(target_store) = target_leader {
        let current_leader = steps.iter().rev().find_map(|s| match s {
            OperatorStep::TransferLeader { to, .. } => Some(*to),
            _ => None,
        });
        if current_leader.unwrap_or(leader.store_id) != target_store {
            let from = current_leader.unwrap_or(leader.store_id);
            steps.push(OperatorStep::TransferLeader { from, to: target_store });
        }
    }
}

fn build_sequential(
    region: &Region,
    d: &Diff,
    leader: Peer,
    target_leader: Option<StoreId>,
    alloc_peer_id: &mut dyn FnMut() -> PeerId,
    steps: &mut Vec<OperatorStep>,
) {
    for store in &d.to_promote {
        if let Some(p) = region.peer_on_store(*store) {
            steps.push(OperatorStep::PromoteLearner { to_store: *store, peer_id: p.id });
        }
    }
    for store in &d.to_demote {
        if let Some(p) = region.peer_on_store(*store) {
            steps.push(OperatorStep::DemoteFollower { to_store: *store, peer_id: p.id });
        }
    }
    for (store, role) in &d.to_add {
        let peer_id = alloc_peer_id();
        // Every addition is routed through learner state first regardless
        // of the desired end role: a voter added directly could be asked to
        // vote before it has caught up, a learner never votes so this is
        // always safe and cheaper than a snapshot-heavy direct add.
        steps.push(OperatorStep::AddLearner { to_store: *store, peer_id, light: false });
        if *role == DesiredRole::Voter {
            steps.push(OperatorStep::PromoteLearner { to_store: *store, peer_id });
        }
    }

    let mut current_leader_store = leader.store_id;
    for store in &d.to_remove {
        if *store == current_leader_store {
            if let Some(interim) = interim_leader_candidate(region, *store) {
                steps.push(OperatorStep::TransferLeader { from: current_leader_store, to: interim });
                current_leader_store = interim;
            }
        }
        steps.push(OperatorStep::RemovePeer { from_store: *store });
    }

    if let Some(target_store) = target_leader {
        if current_leader_store != target_store {
            steps.push(OperatorStep::TransferLeader { from: current_leader_store, to: target_store });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::ids::RegionId;

    fn region_with_peers(peers: Vec<Peer>, leader_store: StoreId) -> Region {
        let mut r = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        let leader = peers.iter().find(|p| p.store_id == leader_store).copied();
        r.peers = peers;
        r.leader = leader;
        r
    }

    fn id_alloc() -> impl FnMut() -> PeerId {
        let mut next = 100;
        move || {
            next += 1;
            PeerId::new(next)
        }
    }

    #[test]
    fn sequential_add_promotes_through_learner() {
        let region = region_with_peers(vec![Peer::new_voter(PeerId::new(1), StoreId::new(1))], StoreId::new(1));
        let mut target = BTreeMap::new();
        target.insert(StoreId::new(1), DesiredRole::Voter);
        target.insert(StoreId::new(2), DesiredRole::Voter);

        let mut alloc = id_alloc();
        let op = build(&region, &target, None, false, OperatorPriority::Normal, "add replica", &mut alloc).unwrap();

        assert!(matches!(op.steps[0], OperatorStep::AddLearner { to_store, .. } if to_store == StoreId::new(2)));
        assert!(matches!(op.steps[1], OperatorStep::PromoteLearner { to_store, .. } if to_store == StoreId::new(2)));
    }

    #[test]
    fn sequential_remove_transfers_leader_off_target_first() {
        let region = region_with_peers(
            vec![Peer::new_voter(PeerId::new(1), StoreId::new(1)), Peer::new_voter(PeerId::new(2), StoreId::new(2))],
            StoreId::new(1),
        );
        let mut target = BTreeMap::new();
        target.insert(StoreId::new(2), DesiredRole::Voter);

        let mut alloc = id_alloc();
        let op = build(&region, &target, None, false, OperatorPriority::Normal, "remove replica", &mut alloc).unwrap();

        assert!(matches!(op.steps[0], OperatorStep::TransferLeader { from, to } if from == StoreId::new(1) && to == StoreId::new(2)));
        assert!(matches!(op.steps[1], OperatorStep::RemovePeer { from_store } if from_store == StoreId::new(1)));
    }

    #[test]
    fn joint_mode_bundles_changes_into_enter_leave_pair() {
        let region = region_with_peers(vec![Peer::new_voter(PeerId::new(1), StoreId::new(1))], StoreId::new(1));
        let mut target = BTreeMap::new();
        target.insert(StoreId::new(1), DesiredRole::Voter);
        target.insert(StoreId::new(2), DesiredRole::Voter);
        target.insert(StoreId::new(3), DesiredRole::Voter);

        let mut alloc = id_alloc();
        let op = build(&region, &target, None, true, OperatorPriority::Normal, "joint add", &mut alloc).unwrap();

        assert!(matches!(op.steps[0], OperatorStep::ChangePeerV2Enter { .. }));
        assert!(matches!(op.steps[1], OperatorStep::ChangePeerV2Leave));
    }

    #[test]
    fn no_leader_is_rejected() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.peers = vec![Peer::new_voter(PeerId::new(1), StoreId::new(1))];
        let target = BTreeMap::new();
        let mut alloc = id_alloc();
        let result = build(&region, &target, None, false, OperatorPriority::Normal, "x", &mut alloc);
        assert!(matches!(result, Err(BuildError::NoLeader)));
    }
}
