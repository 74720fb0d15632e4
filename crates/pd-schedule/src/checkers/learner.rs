//! The learner checker (spec.md §4.F "Learner checker"): promotes any
//! learner peer that isn't pending. Legacy path for clusters that cannot
//! run joint consensus, so it issues a plain `PromoteLearner` step rather
//! than going through the operator builder's joint/sequential dispatch.

use pd_api::cluster::ClusterView;
use pd_api::scheduling::Checker;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use pd_types::region::Region;

pub struct LearnerChecker;

impl Checker for LearnerChecker {
    fn name(&self) -> &'static str {
        "learner-checker"
    }

    fn priority(&self) -> OperatorPriority {
        OperatorPriority::Normal
    }

    fn check(&self, _cluster: &dyn ClusterView, region: &Region) -> Option<Operator> {
        if region.leader.is_none() || region.is_freshly_loaded() {
            return None;
        }
        let learner = region.learners().find(|p| !region.is_pending(p.id))?;

        Some(Operator::new(
            "promote-learner",
            region.id,
            region.epoch,
            OperatorKind::REGION | OperatorKind::REPLICA,
            vec![OperatorStep::PromoteLearner { to_store: learner.store_id, peer_id: learner.id }],
            OperatorPriority::Normal,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCluster;
    use pd_types::ids::{PeerId, RegionId, StoreId};
    use pd_types::peer::Peer;

    #[test]
    fn promotes_non_pending_learner() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        region.leader = Some(Peer::new_voter(PeerId::new(1), StoreId::new(1)));
        region.peers = vec![
            Peer::new_voter(PeerId::new(1), StoreId::new(1)),
            Peer::new_learner(PeerId::new(2), StoreId::new(2)),
        ];

        let cluster = FakeCluster::default();
        let op = LearnerChecker.check(&cluster, &region).expect("learner should be promoted");
        assert_eq!(op.steps, vec![OperatorStep::PromoteLearner { to_store: StoreId::new(2), peer_id: PeerId::new(2) }]);
    }

    #[test]
    fn skips_pending_learner() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.approximate_size = 10;
        region.leader = Some(Peer::new_voter(PeerId::new(1), StoreId::new(1)));
        let learner = Peer::new_learner(PeerId::new(2), StoreId::new(2));
        region.peers = vec![Peer::new_voter(PeerId::new(1), StoreId::new(1)), learner];
        region.pending_peers = vec![learner];

        let cluster = FakeCluster::default();
        assert!(LearnerChecker.check(&cluster, &region).is_none());
    }
}
