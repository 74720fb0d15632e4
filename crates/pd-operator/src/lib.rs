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

//! # pd-operator
//!
//! The operator builder (spec.md §4.E): diffs a region's current peer
//! placement against a desired target and compiles either a joint-consensus
//! or sequential membership-change plan, enforcing the leader-safety rules.

pub mod builder;

pub use builder::{build, BuildError, DesiredRole};
