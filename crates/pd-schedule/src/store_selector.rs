//! The two-stage store selector shared by the replica checker and the
//! balance schedulers (spec.md §4.F "Store selection for additions").
//!
//! `ClusterView` has no "all stores" accessor, so callers gather the
//! candidate pool themselves (typically every `Up` store) and pass it in.

use pd_types::config::PdConfig;
use pd_types::ids::StoreId;
use pd_types::region::Region;
use pd_types::rules::isolation_score;
use pd_types::store::{Store, StoreState};

/// Stage 1: rank candidate stores (excluding any already hosting a peer of
/// `region`) by isolation score against the region's existing peer stores,
/// ignoring transient load signals (busy flag, snapshot backlog) entirely.
pub fn rank_candidates(region: &Region, config: &PdConfig, candidates: &[Store]) -> Vec<Store> {
    let existing_ids = region.store_ids();
    let existing_stores: Vec<&Store> = candidates.iter().filter(|s| existing_ids.contains(&s.id)).collect();
    let mut scored: Vec<(f64, Store)> = candidates
        .iter()
        .filter(|s| !existing_ids.contains(&s.id))
        .map(|s| (isolation_score(&config.location_labels, s, &existing_stores), s.clone()))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(_, s)| s).collect()
}

/// Stage-2 strict filter: legal target for an `AddPeer`/`AddLearner` right
/// now, ignoring isolation (already applied in stage 1).
pub fn passes_strict_filter(store: &Store, config: &PdConfig) -> bool {
    if !matches!(store.state, StoreState::Up) {
        return false;
    }
    if store.capacity_bytes > 0 {
        let free_ratio = store.available_bytes() as f64 / store.capacity_bytes as f64;
        if free_ratio < 1.0 - config.low_space_ratio {
            return false;
        }
    }
    if store.add_peer_limiter.in_use() >= store.add_peer_limiter.limit() {
        return false;
    }
    true
}

/// The full two-stage selection described in spec.md §4.F: pick the
/// isolation-best candidate, then re-apply strict filters. If the winner
/// fails stage 2, the caller should queue the region for retry rather than
/// falling back to a worse location.
pub fn pick_store_for_add(region: &Region, config: &PdConfig, candidates: &[Store]) -> Option<StoreId> {
    let ranked = rank_candidates(region, config, candidates);
    let winner = ranked.first()?;
    if passes_strict_filter(winner, config) {
        Some(winner.id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::ids::{PeerId, RegionId};
    use pd_types::peer::Peer;

    fn store(id: u64, zone: &str) -> Store {
        let mut s = Store::new(StoreId::new(id), format!("127.0.0.1:{id}"));
        s.labels.insert("zone".to_string(), zone.to_string());
        s.capacity_bytes = 100;
        s.observe_available(100);
        s
    }

    #[test]
    fn prefers_store_in_a_different_zone() {
        let mut region = Region::new(RegionId::new(1), b"a".to_vec(), b"z".to_vec());
        region.peers.push(Peer::new_voter(PeerId::new(1), StoreId::new(1)));

        let mut config = PdConfig::default();
        config.location_labels = vec!["zone".to_string()];

        // store 1 (existing peer) is in z1, so store 3 in z2 should rank first.
        let ranked = rank_candidates(&region, &config, &[store(1, "z1"), store(2, "z1"), store(3, "z2")]);
        assert_eq!(ranked.first().map(|s| s.id), Some(StoreId::new(3)));
    }

    #[test]
    fn strict_filter_rejects_low_space_store() {
        let mut s = store(5, "z1");
        s.capacity_bytes = 100;
        s.observe_available(1);
        let config = PdConfig::default();
        assert!(!passes_strict_filter(&s, &config));
    }

    #[test]
    fn strict_filter_rejects_offline_store() {
        let mut s = store(6, "z1");
        s.state = StoreState::Offline;
        let config = PdConfig::default();
        assert!(!passes_strict_filter(&s, &config));
    }
}
