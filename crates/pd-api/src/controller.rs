//! Operator controller contract (spec.md §4.H), split out so `pd-schedule`
//! can submit operators without depending on `pd-controller`'s dispatch
//! heap and rate-limiter state directly.

use pd_types::{Operator, RegionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("operator conflict on region {0}: higher-priority operator already running")]
    OperatorConflict(u64),
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl pd_types::error::ErrorCode for ControllerError {
    fn code(&self) -> &'static str {
        match self {
            ControllerError::OperatorConflict(_) => "CONTROLLER_OPERATOR_CONFLICT",
            ControllerError::RateLimited(_) => "CONTROLLER_RATE_LIMITED",
        }
    }
}

/// The net effect a running (but not yet finished) operator has on a
/// store's load, used by schedulers to avoid double-counting in-flight work
/// (spec.md §4.G.1 `Iₛ, Iₜ`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOpInfluence {
    pub leader_count_delta: i64,
    pub region_count_delta: i64,
    pub region_size_delta: i64,
}

pub trait OperatorController: Send + Sync {
    /// Admits `op` if no conflicting higher-or-equal priority operator is
    /// already running on its region, and the per-store rate limiters for
    /// any add/remove-peer steps it carries have spare capacity.
    fn add_operator(&self, op: Operator) -> Result<(), ControllerError>;

    fn get_operator(&self, region: RegionId) -> Option<Operator>;
    fn remove_operator(&self, region: RegionId);

    /// Net in-flight influence of all running operators touching `store`.
    fn get_op_influence(&self, store: pd_types::StoreId) -> StoreOpInfluence;
}
