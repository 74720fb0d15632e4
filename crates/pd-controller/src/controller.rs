//! The operator controller (spec.md §4.H): admission, per-store rate
//! limiting, and the next-dispatch heap, all behind one lock covering the
//! region -> operator map, the heap, and the rate limiters (spec.md §5).

use crate::heap::{DispatchHeap, HistoryEntry, HistoryRing, STEP_INTERVAL};
use parking_lot::RwLock;
use pd_api::controller::{ControllerError, OperatorController, StoreOpInfluence};
use pd_types::config::PdConfig;
use pd_types::ids::{RegionId, StoreId};
use pd_types::operator::{Operator, OperatorKind, OperatorStatus, OperatorStep};
use pd_types::region::Region;
use pd_types::store::ActionRateLimiter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const HISTORY_CAPACITY: usize = 1000;
const STORE_LIMITER_CAPACITY: u32 = 8;
const STORE_LIMITER_REFILL: Duration = Duration::from_secs(1);

struct Inner {
    running: HashMap<RegionId, Operator>,
    heap: DispatchHeap,
    history: HistoryRing,
    add_limiters: HashMap<StoreId, ActionRateLimiter>,
    remove_limiters: HashMap<StoreId, ActionRateLimiter>,
}

impl Inner {
    fn new() -> Self {
        Self {
            running: HashMap::new(),
            heap: DispatchHeap::new(),
            history: HistoryRing::new(HISTORY_CAPACITY),
            add_limiters: HashMap::new(),
            remove_limiters: HashMap::new(),
        }
    }

    fn kind_count(&self, flag: OperatorKind) -> usize {
        self.running.values().filter(|op| op.kind.contains(flag)).count()
    }
}

/// A single operator-kind slot tracked against its config-configured
/// concurrency limit (spec.md §4.H admission rule 2).
fn kind_limits(config: &PdConfig) -> [(OperatorKind, u32); 4] {
    [
        (OperatorKind::LEADER, config.leader_schedule_limit),
        (OperatorKind::REGION, config.region_schedule_limit),
        (OperatorKind::MERGE, config.merge_schedule_limit),
        (OperatorKind::REPLICA, config.replica_schedule_limit),
    ]
}

pub struct OperatorControllerImpl {
    config: Arc<RwLock<PdConfig>>,
    inner: RwLock<Inner>,
}

impl OperatorControllerImpl {
    pub fn new(config: Arc<RwLock<PdConfig>>) -> Self {
        Self { config, inner: RwLock::new(Inner::new()) }
    }

    fn limiter_for<'a>(map: &'a mut HashMap<StoreId, ActionRateLimiter>, store: StoreId) -> &'a mut ActionRateLimiter {
        map.entry(store).or_insert_with(|| ActionRateLimiter::new(STORE_LIMITER_CAPACITY, STORE_LIMITER_REFILL))
    }

    /// Verifies the region-epoch captured by `op` still matches `observed`;
    /// marks the operator Cancelled as stale otherwise (spec.md §4.H
    /// `Dispatch`: "verify epoch matches captured epoch (else mark
    /// Cancelled as stale)").
    fn epoch_still_valid(op: &Operator, observed: Option<&Region>) -> bool {
        observed.map(|r| r.epoch == op.region_epoch).unwrap_or(true)
    }

    /// Advances `region`'s running operator against `observed` and returns
    /// the step that is now pending, retiring the operator if it finished
    /// or the epoch went stale (spec.md §4.H `Dispatch`).
    pub fn dispatch(&self, region: RegionId, observed: Option<&Region>) -> Option<OperatorStep> {
        let mut inner = self.inner.write();
        let op = inner.running.get_mut(&region)?;

        if !Self::epoch_still_valid(op, observed) {
            op.status.terminalize(OperatorStatus::Cancelled);
            pd_telemetry::sinks::controller_metrics().inc_operator_finished("cancelled");
            Self::retire(&mut inner, region);
            return None;
        }

        let step = op.advance(observed).cloned();
        if op.is_finished() {
            let status = op.status.load();
            pd_telemetry::sinks::controller_metrics().inc_operator_finished(status_label(status));
            Self::retire(&mut inner, region);
        }
        step
    }

    fn retire(inner: &mut Inner, region: RegionId) {
        if let Some(op) = inner.running.remove(&region) {
            inner.history.push(HistoryEntry {
                region,
                description: op.description.clone(),
                status: op.status.load(),
                finished_at: Instant::now(),
            });
        }
        pd_telemetry::sinks::controller_metrics().set_running_operator_count(inner.running.len() as i64);
    }

    /// Pops one entry whose scheduled dispatch time has elapsed, re-queuing
    /// it for the next cycle if the operator is still running. Returns
    /// `(region, has_more)` so the caller can drain the heap in one pass
    /// (spec.md §4.H dispatch loop).
    pub fn poll_due(&self, now: Instant) -> Option<(RegionId, bool)> {
        loop {
            let mut inner = self.inner.write();
            let (region, has_more) = inner.heap.pop_due(now)?;
            let still_running = inner.running.get(&region).map(|op| !op.is_finished()).unwrap_or(false);
            if still_running {
                inner.heap.push(region, now + STEP_INTERVAL);
                return Some((region, has_more));
            }
            if !has_more {
                return None;
            }
        }
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    /// A snapshot of every operator currently running, for admin listing.
    pub fn list_operators(&self) -> Vec<Operator> {
        self.inner.read().running.values().cloned().collect()
    }
}

fn status_label(status: OperatorStatus) -> &'static str {
    match status {
        OperatorStatus::Success => "success",
        OperatorStatus::Timeout => "timeout",
        OperatorStatus::Cancelled => "cancelled",
        OperatorStatus::Replaced => "replaced",
        OperatorStatus::Expired => "expired",
        OperatorStatus::Created | OperatorStatus::Started => "unfinished",
    }
}

impl OperatorController for OperatorControllerImpl {
    fn add_operator(&self, mut op: Operator) -> Result<(), ControllerError> {
        let config = self.config.read();
        let mut inner = self.inner.write();

        if let Some(current) = inner.running.get(&op.region_id) {
            if !current.is_finished() && current.priority >= op.priority {
                pd_telemetry::sinks::controller_metrics().inc_operator_rejected("conflict");
                return Err(ControllerError::OperatorConflict(op.region_id.get()));
            }
        }

        for (flag, limit) in kind_limits(&config) {
            if op.kind.contains(flag) && inner.kind_count(flag) as u32 >= limit {
                pd_telemetry::sinks::controller_metrics().inc_operator_rejected("kind_limit");
                return Err(ControllerError::RateLimited(format!("kind limit reached for {flag:?}")));
            }
        }

        for step in &op.steps {
            match step {
                OperatorStep::AddPeer { to_store, .. } | OperatorStep::AddLearner { to_store, .. } => {
                    if !Self::limiter_for(&mut inner.add_limiters, *to_store).try_acquire() {
                        pd_telemetry::sinks::controller_metrics().inc_operator_rejected("add_peer_rate_limit");
                        return Err(ControllerError::RateLimited(format!("add-peer limit exhausted on store {to_store}")));
                    }
                }
                OperatorStep::RemovePeer { from_store } => {
                    if !Self::limiter_for(&mut inner.remove_limiters, *from_store).try_acquire() {
                        pd_telemetry::sinks::controller_metrics().inc_operator_rejected("remove_peer_rate_limit");
                        return Err(ControllerError::RateLimited(format!("remove-peer limit exhausted on store {from_store}")));
                    }
                }
                _ => {}
            }
        }

        if let Some(prev) = inner.running.get_mut(&op.region_id) {
            prev.status.terminalize(OperatorStatus::Replaced);
            Self::retire(&mut inner, op.region_id);
        }

        op.start();
        let region = op.region_id;
        inner.running.insert(region, op);
        inner.heap.push(region, Instant::now() + STEP_INTERVAL);
        pd_telemetry::sinks::controller_metrics().set_running_operator_count(inner.running.len() as i64);
        Ok(())
    }

    fn get_operator(&self, region: RegionId) -> Option<Operator> {
        self.inner.read().running.get(&region).cloned()
    }

    fn remove_operator(&self, region: RegionId) {
        let mut inner = self.inner.write();
        if let Some(op) = inner.running.get_mut(&region) {
            op.status.terminalize(OperatorStatus::Cancelled);
        }
        Self::retire(&mut inner, region);
    }

    fn get_op_influence(&self, store: StoreId) -> StoreOpInfluence {
        let inner = self.inner.read();
        let mut influence = StoreOpInfluence::default();
        for op in inner.running.values() {
            let Some(step) = op.current_step() else { continue };
            match step {
                OperatorStep::TransferLeader { from, to } => {
                    if *from == store {
                        influence.leader_count_delta -= 1;
                    }
                    if *to == store {
                        influence.leader_count_delta += 1;
                    }
                }
                OperatorStep::AddPeer { to_store, .. } | OperatorStep::AddLearner { to_store, .. } => {
                    if *to_store == store {
                        influence.region_count_delta += 1;
                    }
                }
                OperatorStep::RemovePeer { from_store } => {
                    if *from_store == store {
                        influence.region_count_delta -= 1;
                    }
                }
                _ => {}
            }
        }
        influence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::epoch::RegionEpoch;
    use pd_types::ids::{PeerId, StoreId};
    use pd_types::operator::OperatorPriority;

    fn op(region: u64, kind: OperatorKind, priority: OperatorPriority, steps: Vec<OperatorStep>) -> Operator {
        Operator::new("test-op", RegionId::new(region), RegionEpoch::new(1, 1), kind, steps, priority)
    }

    #[test]
    fn rejects_lower_priority_conflict() {
        let controller = OperatorControllerImpl::new(Arc::new(RwLock::new(PdConfig::default())));
        controller
            .add_operator(op(1, OperatorKind::REGION, OperatorPriority::High, vec![OperatorStep::TransferLeader {
                from: StoreId::new(1),
                to: StoreId::new(2),
            }]))
            .expect("first operator admitted");

        let result = controller.add_operator(op(1, OperatorKind::REGION, OperatorPriority::Normal, vec![]));
        assert!(matches!(result, Err(ControllerError::OperatorConflict(1))));
    }

    #[test]
    fn higher_priority_replaces_running_operator() {
        let controller = OperatorControllerImpl::new(Arc::new(RwLock::new(PdConfig::default())));
        controller.add_operator(op(1, OperatorKind::REGION, OperatorPriority::Normal, vec![])).unwrap();
        controller.add_operator(op(1, OperatorKind::REGION, OperatorPriority::High, vec![])).unwrap();
        assert_eq!(controller.get_operator(RegionId::new(1)).unwrap().priority, OperatorPriority::High);
    }

    #[test]
    fn add_peer_rate_limit_rejects_past_capacity() {
        let controller = OperatorControllerImpl::new(Arc::new(RwLock::new(PdConfig::default())));
        for i in 0..STORE_LIMITER_CAPACITY {
            let step = OperatorStep::AddPeer { to_store: StoreId::new(9), peer_id: PeerId::new(i as u64), light: false };
            controller.add_operator(op(i as u64 + 100, OperatorKind::REPLICA, OperatorPriority::Normal, vec![step])).unwrap();
        }
        let overflow_step = OperatorStep::AddPeer { to_store: StoreId::new(9), peer_id: PeerId::new(999), light: false };
        let result = controller.add_operator(op(5000, OperatorKind::REPLICA, OperatorPriority::Normal, vec![overflow_step]));
        assert!(matches!(result, Err(ControllerError::RateLimited(_))));
    }

    #[test]
    fn influence_reflects_pending_transfer_leader() {
        let controller = OperatorControllerImpl::new(Arc::new(RwLock::new(PdConfig::default())));
        controller
            .add_operator(op(1, OperatorKind::LEADER, OperatorPriority::Normal, vec![OperatorStep::TransferLeader {
                from: StoreId::new(1),
                to: StoreId::new(2),
            }]))
            .unwrap();
        assert_eq!(controller.get_op_influence(StoreId::new(2)).leader_count_delta, 1);
        assert_eq!(controller.get_op_influence(StoreId::new(1)).leader_count_delta, -1);
    }
}
