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

//! # pd-cluster
//!
//! The in-memory cluster model (spec.md §4.A): the store and region maps,
//! the start-key-ordered region tree used for point/range/overlap lookups,
//! and the per-store position sets backing the random-region-selection
//! operations schedulers and checkers depend on through `pd_api::cluster::ClusterView`.

mod cluster_model;
mod region_tree;
mod selection;

pub use cluster_model::ClusterModel;
