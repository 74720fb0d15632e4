//! The patrol loop (spec.md §4.F/§4.G): walks every region through the
//! checker pipeline and ticks every registered scheduler, submitting any
//! operator either produces to the operator controller.

use pd_api::cluster::ClusterView;
use pd_api::controller::OperatorController;
use pd_api::scheduling::{Checker, Scheduler};
use pd_controller::OperatorControllerImpl;
use pd_types::operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};
use std::sync::Arc;
use std::time::Duration;

/// How often the patrol sweeps every region and ticks every scheduler.
pub const PATROL_INTERVAL: Duration = Duration::from_millis(500);
/// How often the dispatch heap is drained to advance in-flight operators
/// that are due for their next step even without a fresh heartbeat.
pub const DISPATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A named, independently enable-able scheduler, so admin tooling (an
/// `evict-leader` or `shuffle-leader` scheduler added for one store) can be
/// added and removed by name without restarting the process.
pub struct SchedulerRegistry {
    entries: parking_lot::RwLock<Vec<(String, Arc<dyn Scheduler>)>>,
}

impl SchedulerRegistry {
    pub fn new(defaults: Vec<Arc<dyn Scheduler>>) -> Self {
        let entries = defaults.into_iter().map(|s| (s.name().to_string(), s)).collect();
        Self { entries: parking_lot::RwLock::new(entries) }
    }

    pub fn add(&self, scheduler: Arc<dyn Scheduler>) {
        let mut entries = self.entries.write();
        entries.retain(|(name, _)| name != scheduler.name());
        entries.push((scheduler.name().to_string(), scheduler));
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(n, _)| n != name);
        entries.len() != before
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(name, _)| name.clone()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Scheduler>> {
        self.entries.read().iter().map(|(_, s)| s.clone()).collect()
    }
}

fn eligible_for_checkers(region: &pd_types::region::Region) -> bool {
    region.leader.is_some() && region.approximate_size > 0
}

/// A merge checker's active operator implies a passive counterpart on the
/// target region (spec.md §4.F "emit a pair of operators: one active merge
/// on R, one passive on the target"). The `Checker` trait returns at most
/// one operator per call, so the passive side is synthesized here from the
/// active one's own `MergeRegion` step rather than threaded back through
/// the trait.
pub(crate) fn passive_merge_counterpart(cluster: &dyn ClusterView, op: &Operator) -> Option<Operator> {
    let [OperatorStep::MergeRegion { source, target, is_passive: false, target_union_start, target_union_end }] = op.steps.as_slice() else {
        return None;
    };
    let target_region = cluster.get_region(*target)?;
    Some(Operator::new(
        "merge-region-passive",
        *target,
        target_region.epoch,
        OperatorKind::REGION | OperatorKind::MERGE,
        vec![OperatorStep::MergeRegion {
            source: *source,
            target: *target,
            is_passive: true,
            target_union_start: target_union_start.clone(),
            target_union_end: target_union_end.clone(),
        }],
        OperatorPriority::Low,
    ))
}

/// Submits a checker- or scheduler-produced operator, first submitting its
/// passive merge counterpart (if any) so both sides of a merge land before
/// either starts dispatching.
pub(crate) fn submit_operator(cluster: &dyn ClusterView, controller: &OperatorControllerImpl, component: &str, op: Operator) {
    if let Some(passive) = passive_merge_counterpart(cluster, &op) {
        if let Err(e) = controller.add_operator(passive) {
            tracing::debug!(target: "pd_server", component, error = %e, "passive merge operator rejected");
        }
    }
    if let Err(e) = controller.add_operator(op) {
        tracing::debug!(target: "pd_server", component, error = %e, "operator rejected");
    }
}

/// One full sweep: every region through every checker (first match wins,
/// per spec.md §4.F priority ordering of the checker list), then every
/// enabled scheduler once against the whole cluster.
fn run_once(
    cluster: &dyn ClusterView,
    controller: &OperatorControllerImpl,
    checkers: &[Arc<dyn Checker>],
    schedulers: &SchedulerRegistry,
) {
    for region in cluster.scan_range(&[], &[], 0) {
        if !eligible_for_checkers(&region) {
            continue;
        }
        for checker in checkers {
            if let Some(op) = checker.check(cluster, &region) {
                submit_operator(cluster, controller, checker.name(), op);
                break;
            }
        }
    }

    for scheduler in schedulers.snapshot() {
        if !scheduler.is_enabled() {
            continue;
        }
        if let Some(op) = scheduler.schedule(cluster) {
            submit_operator(cluster, controller, scheduler.name(), op);
        }
    }
}

/// Runs the patrol sweep until cancelled (dropping the returned
/// `JoinHandle` stops it).
pub fn spawn_patrol_loop(
    cluster: Arc<dyn ClusterView>,
    controller: Arc<OperatorControllerImpl>,
    checkers: Vec<Arc<dyn Checker>>,
    schedulers: Arc<SchedulerRegistry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PATROL_INTERVAL);
        loop {
            ticker.tick().await;
            run_once(cluster.as_ref(), controller.as_ref(), &checkers, schedulers.as_ref());
        }
    })
}

/// Drains the dispatch heap on a fixed interval so operators keep advancing
/// even for regions that haven't heartbeat since the last step completed.
pub fn spawn_dispatch_poll_loop(
    cluster: Arc<dyn ClusterView>,
    controller: Arc<OperatorControllerImpl>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DISPATCH_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let now = tokio::time::Instant::now().into_std();
            loop {
                match controller.poll_due(now) {
                    Some((region_id, has_more)) => {
                        let observed = cluster.get_region(region_id);
                        controller.dispatch(region_id, observed.as_ref());
                        if !has_more {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_schedule::schedulers::EvictLeaderScheduler;
    use pd_types::StoreId;

    #[test]
    fn add_replaces_an_existing_entry_with_the_same_name() {
        let registry = SchedulerRegistry::new(vec![Arc::new(EvictLeaderScheduler::new(StoreId::new(1)))]);
        assert_eq!(registry.names(), vec!["evict-leader-scheduler".to_string()]);

        registry.add(Arc::new(EvictLeaderScheduler::new(StoreId::new(2))));
        assert_eq!(registry.names(), vec!["evict-leader-scheduler".to_string()]);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn remove_reports_whether_an_entry_existed() {
        let registry = SchedulerRegistry::new(vec![Arc::new(EvictLeaderScheduler::new(StoreId::new(1)))]);
        assert!(registry.remove("evict-leader-scheduler"));
        assert!(!registry.remove("evict-leader-scheduler"));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn passive_merge_counterpart_targets_the_other_region() {
        use pd_cluster::cluster_model::ClusterModel;
        use pd_types::region::Region;
        use pd_types::RegionId;

        let cluster = ClusterModel::new();
        let target = Region::new(RegionId::new(2), b"t".to_vec(), b"x".to_vec());
        cluster.put_region(target.clone());

        let active = Operator::new(
            "merge-region-active",
            RegionId::new(1),
            Default::default(),
            OperatorKind::REGION | OperatorKind::MERGE,
            vec![OperatorStep::MergeRegion {
                source: RegionId::new(1),
                target: RegionId::new(2),
                is_passive: false,
                target_union_start: b"a".to_vec(),
                target_union_end: b"x".to_vec(),
            }],
            OperatorPriority::Low,
        );

        let passive = passive_merge_counterpart(&cluster, &active).expect("passive counterpart");
        assert_eq!(passive.region_id, RegionId::new(2));
        assert_eq!(passive.region_epoch, target.epoch);
        match &passive.steps[..] {
            [OperatorStep::MergeRegion { is_passive: true, source, target: t, .. }] => {
                assert_eq!(*source, RegionId::new(1));
                assert_eq!(*t, RegionId::new(2));
            }
            other => panic!("unexpected steps: {other:?}"),
        }
    }

    #[test]
    fn no_passive_counterpart_for_non_merge_operators() {
        use pd_cluster::cluster_model::ClusterModel;
        use pd_types::RegionId;

        let cluster = ClusterModel::new();
        let op = Operator::new(
            "evict-leader",
            RegionId::new(1),
            Default::default(),
            OperatorKind::LEADER,
            vec![OperatorStep::TransferLeader { from: StoreId::new(1), to: StoreId::new(2) }],
            OperatorPriority::High,
        );
        assert!(passive_merge_counterpart(&cluster, &op).is_none());
    }
}
