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

//! # pd-schedule
//!
//! Checkers and schedulers (spec.md §4.F, §4.G): the patrol-driven repair
//! pass over every region and the cluster-wide balance/admin schedulers,
//! both producing operators through `pd-operator`'s builder.

pub mod checkers;
pub mod hot_stat;
pub mod priority_queue;
pub mod schedulers;
pub mod should_balance;
pub mod store_selector;

#[cfg(test)]
mod test_support;

/// A peer-id allocator that is never actually called: `pd-operator::build`
/// only invokes its `alloc_peer_id` argument for entries in `Diff::to_add`,
/// and callers that build a pure-removal target map have no additions.
pub(crate) fn no_alloc_needed() -> pd_types::ids::PeerId {
    unreachable!("build() only calls alloc_peer_id for additions, and this target map adds nothing")
}
