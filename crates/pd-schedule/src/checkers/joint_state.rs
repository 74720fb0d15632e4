//! Joint-state checker (spec.md §4.F): any peer stuck in `IncomingVoter` or
//! `DemotingVoter` means a prior joint-consensus change never left the
//! intermediate configuration; this is recovery, so it always runs at high
//! priority ahead of ordinary balancing.

use pd_api::cluster::ClusterView;
use pd_api::scheduling::Checker;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::region::Region;

pub struct JointStateChecker;

impl Checker for JointStateChecker {
    fn name(&self) -> &'static str {
        "joint-state-checker"
    }

    fn priority(&self) -> OperatorPriority {
        OperatorPriority::High
    }

    fn check(&self, _cluster: &dyn ClusterView, region: &Region) -> Option<Operator> {
        if region.leader.is_none() || region.is_freshly_loaded() {
            return None;
        }
        if !region.has_any_joint_state_peer() {
            return None;
        }
        Some(Operator::new(
            "leave-joint-state",
            region.id,
            region.epoch,
            OperatorKind::REGION | OperatorKind::ADMIN,
            vec![OperatorStep::ChangePeerV2Leave],
            OperatorPriority::High,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCluster;
    use pd_types::ids::{PeerId, RegionId, StoreId};
    use pd_types::peer::{Peer, PeerRole};

    #[test]
    fn emits_leave_joint_state_when_peer_in_joint_role() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        region.leader = Some(Peer::new_voter(PeerId::new(1), StoreId::new(1)));
        region.peers = vec![
            Peer::new_voter(PeerId::new(1), StoreId::new(1)),
            Peer { id: PeerId::new(2), store_id: StoreId::new(2), role: PeerRole::IncomingVoter },
        ];

        let checker = JointStateChecker;
        let cluster = FakeCluster::default();
        let op = checker.check(&cluster, &region).expect("joint state should be flagged");
        assert_eq!(op.steps, vec![OperatorStep::ChangePeerV2Leave]);
    }

    #[test]
    fn no_op_without_joint_state_peers() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        region.leader = Some(Peer::new_voter(PeerId::new(1), StoreId::new(1)));
        region.peers = vec![Peer::new_voter(PeerId::new(1), StoreId::new(1))];
        let cluster = FakeCluster::default();
        assert!(JointStateChecker.check(&cluster, &region).is_none());
    }
}
