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

//! # pd-tso
//!
//! The timestamp oracle (spec.md §4.I): a batched, single-leader monotonic
//! clock implementing `pd_api::tso::TimestampOracle`.

pub mod oracle;

pub use oracle::TsoOracle;
