#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! # pd-api
//!
//! Trait surface shared across the placement driver's component crates:
//! the cluster model view, the persistence gateway, the checker/scheduler
//! dynamic-dispatch interface, id allocation, the timestamp oracle, and the
//! operator controller. Depends only on `pd-types`.

pub mod cluster;
pub mod controller;
pub mod ids;
pub mod scheduling;
pub mod storage;
pub mod tso;

pub mod prelude {
    pub use crate::cluster::{ClusterError, ClusterView, PutRegionOutcome, RegionPredicate};
    pub use crate::controller::{ControllerError, OperatorController, StoreOpInfluence};
    pub use crate::ids::{IdAllocator, IdAllocatorError, SyncIdSource};
    pub use crate::scheduling::{Checker, ComponentKind, Scheduler};
    pub use crate::storage::{KvPair, PersistenceGateway, StorageError};
    pub use crate::tso::{TimestampOracle, Timestamp, TsoError};
}
