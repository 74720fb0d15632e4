//! The cluster model's trait surface (spec.md §4.A), implemented by
//! `pd-cluster` and consumed by `pd-schedule`, `pd-controller`, and
//! `pd-server` without any of them depending on the in-memory index
//! structures directly.

use pd_types::{Region, RegionEpoch, RegionId, Store, StoreId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("store {0} not found")]
    StoreNotFound(u64),
    #[error("store {0} is tombstone")]
    StoreTombstone(u64),
    #[error("region {0} not found")]
    RegionNotFound(u64),
    #[error("region heartbeat epoch {reported:?} is stale against cached {cached:?}")]
    StaleRequest { reported: RegionEpoch, cached: RegionEpoch },
}

impl pd_types::error::ErrorCode for ClusterError {
    fn code(&self) -> &'static str {
        match self {
            ClusterError::StoreNotFound(_) => "CLUSTER_STORE_NOT_FOUND",
            ClusterError::StoreTombstone(_) => "CLUSTER_STORE_TOMBSTONE",
            ClusterError::RegionNotFound(_) => "CLUSTER_REGION_NOT_FOUND",
            ClusterError::StaleRequest { .. } => "CLUSTER_STALE_REQUEST",
        }
    }
}

/// A predicate a `RandLeaderRegion`/`RandFollowerRegion`/… pick must satisfy;
/// spec.md §4.A's random-selection operations take a variadic predicate
/// list, modeled here as a slice of boxed closures.
pub type RegionPredicate<'a> = &'a (dyn Fn(&Region) -> bool + Sync);

/// Outcome of `PutRegion`: the region actually stored, plus any previously
/// indexed regions whose range it displaced (spec.md §4.A).
#[derive(Debug, Clone)]
pub struct PutRegionOutcome {
    pub stored: Region,
    pub displaced: Vec<Region>,
}

/// The queryable, mutable snapshot of stores and regions (spec.md §4.A).
/// Every accessor returns a deep clone so callers cannot observe mutation
/// mid-inspection.
pub trait ClusterView: Send + Sync {
    fn get_store(&self, id: StoreId) -> Option<Store>;
    fn get_region(&self, id: RegionId) -> Option<Region>;
    fn get_region_by_key(&self, key: &[u8]) -> Option<Region>;

    /// (prev, next) neighbours of `region` in start-key order.
    fn get_adjacent_regions(&self, region: &Region) -> (Option<Region>, Option<Region>);

    fn scan_range(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<Region>;

    fn get_overlaps(&self, start: &[u8], end: &[u8]) -> Vec<Region>;

    /// Every known store, for callers (checkers, schedulers) that need to
    /// enumerate the candidate pool for store selection; `ClusterView`
    /// otherwise only exposes point lookups by id.
    fn all_stores(&self) -> Vec<Store>;

    fn get_region_stores(&self, region: &Region) -> Vec<Store>;
    fn get_follower_stores(&self, region: &Region) -> Vec<Store>;
    fn get_leader_store(&self, region: &Region) -> Option<Store>;

    fn rand_leader_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region>;
    fn rand_follower_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region>;
    fn rand_pending_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region>;
    fn rand_learner_region(&self, store: StoreId, preds: &[RegionPredicate<'_>]) -> Option<Region>;

    fn put_store(&self, store: Store);
    fn put_region(&self, region: Region) -> PutRegionOutcome;
    fn remove_region(&self, id: RegionId) -> Option<Region>;
    fn update_store_status(&self, id: StoreId, f: &mut dyn FnMut(&mut Store)) -> Result<(), ClusterError>;

    fn store_count(&self) -> usize;
    fn region_count(&self) -> usize;
}

/// Retry budget for random-selection operations over the position-tracking
/// map (spec.md §4.A).
pub const RANDOM_REGION_MAX_RETRY: u32 = 10;
