//! The balance hysteresis check shared by region-balance and leader-balance
//! (spec.md §4.G.1): prevents oscillation by requiring the source to look
//! meaningfully worse than the target even after subtracting/adding a
//! tolerant margin and the in-flight influence of already-dispatched
//! operators.

use pd_types::ids::StoreId;
use pd_types::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    Leader,
    Region,
}

/// Pending operator-influence deltas per store (spec.md §4.H
/// `GetOpInfluence`), consulted by balance schedulers as `Iₛ`/`Iₜ` in the
/// hysteresis check. The operator controller is the real provider; a
/// scheduler running without one simply sees no in-flight effect.
pub trait OpInfluenceProvider: Send + Sync {
    fn influence(&self, store: StoreId, kind: BalanceKind) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoInfluence;

impl OpInfluenceProvider for NoInfluence {
    fn influence(&self, _store: StoreId, _kind: BalanceKind) -> f64 {
        0.0
    }
}

/// Default leader-count tolerance (spec.md §4.G.1).
pub const DEFAULT_LEADER_TOLERANCE: f64 = 5.0;

/// Grows the region-size tolerance ratio with cluster size, capped at twice
/// the configured base ratio and floored at 1.0 (spec.md §4.G.1: "ratio
/// grows with cluster size up to a cap, floor 1.0").
pub fn tolerant_size_ratio(base_ratio: f64, store_count: usize) -> f64 {
    let growth = 1.0 + (store_count as f64).log2().max(0.0) / 10.0;
    (base_ratio * growth).clamp(1.0, base_ratio * 2.0)
}

pub fn tolerant_resource(kind: BalanceKind, region_size: u64, average_region_size: f64, tolerant_ratio: f64) -> f64 {
    match kind {
        BalanceKind::Leader => DEFAULT_LEADER_TOLERANCE,
        BalanceKind::Region => (region_size as f64).max(average_region_size) * tolerant_ratio,
    }
}

pub(crate) fn region_score(store: &Store, delta: f64) -> f64 {
    let capacity = store.capacity_bytes.max(1) as f64;
    (store.region_size as f64 + delta) / capacity
}

pub(crate) fn leader_score(store: &Store, delta: f64) -> f64 {
    store.leader_size as f64 + delta
}

/// `score(source, -T + I_s) > score(target, T + I_t)`.
pub fn should_balance(
    source: &Store,
    target: &Store,
    kind: BalanceKind,
    tolerant: f64,
    influence_source: f64,
    influence_target: f64,
) -> bool {
    match kind {
        BalanceKind::Leader => {
            leader_score(source, -tolerant + influence_source) > leader_score(target, tolerant + influence_target)
        }
        BalanceKind::Region => {
            region_score(source, -tolerant + influence_source) > region_score(target, tolerant + influence_target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::ids::StoreId;

    fn store_with_region_size(size: u64, capacity: u64) -> Store {
        let mut s = Store::new(StoreId::new(1), "127.0.0.1:1");
        s.region_size = size;
        s.capacity_bytes = capacity;
        s
    }

    #[test]
    fn balances_when_source_clearly_more_loaded() {
        let source = store_with_region_size(900, 1000);
        let target = store_with_region_size(100, 1000);
        assert!(should_balance(&source, &target, BalanceKind::Region, 0.05, 0.0, 0.0));
    }

    #[test]
    fn refuses_when_within_tolerance() {
        let source = store_with_region_size(520, 1000);
        let target = store_with_region_size(480, 1000);
        assert!(!should_balance(&source, &target, BalanceKind::Region, 0.1, 0.0, 0.0));
    }

    #[test]
    fn tolerant_ratio_never_drops_below_one() {
        assert!(tolerant_size_ratio(0.1, 1) >= 1.0);
    }
}
