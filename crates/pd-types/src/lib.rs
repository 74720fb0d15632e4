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

//! # pd-types
//!
//! Foundational data structures and error types for the placement driver.
//! This crate has no workspace-internal dependencies and is used by nearly
//! every other crate, so it stays free of async runtimes and I/O concerns.

/// A crate-wide `Result` alias with a default error type.
pub type Result<T, E = error::PdError> = std::result::Result<T, E>;

pub mod config;
pub mod epoch;
pub mod error;
pub mod ids;
pub mod keys;
pub mod operator;
pub mod peer;
pub mod region;
pub mod rules;
pub mod store;

pub use epoch::RegionEpoch;
pub use ids::{PeerId, RegionId, StoreId};
pub use operator::{Operator, OperatorKind, OperatorPriority, OperatorStatus, OperatorStep};
pub use peer::{Peer, PeerRole};
pub use region::Region;
pub use store::{Store, StoreState};
