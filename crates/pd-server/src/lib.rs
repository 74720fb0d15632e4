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

//! # pd-server
//!
//! The composition root: region/store heartbeat ingest (spec.md §4.C), the
//! lease-backed leader lifecycle that owns the timestamp oracle and operator
//! controller while this node is leader (spec.md §4.J), and the patrol loop
//! that drives checkers and schedulers over the cluster model.

pub mod config;
pub mod heartbeat;
pub mod lease;
pub mod leader;
pub mod patrol;
pub mod rpc;
pub mod sync_id;

pub use config::ServerConfig;
pub use heartbeat::HeartbeatIngest;
pub use leader::LeaderLifecycle;
