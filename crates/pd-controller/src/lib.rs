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

//! # pd-controller
//!
//! The operator dispatch controller (spec.md §4.H): admits operators built
//! by `pd-schedule`, rate-limits per-store add/remove-peer steps, and drives
//! the dispatch heap that advances each running operator's current step.

pub mod controller;
pub mod heap;

pub use controller::OperatorControllerImpl;
