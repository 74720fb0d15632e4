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

//! # pd-storage
//!
//! The persistence gateway (spec.md §4.B): a `redb`-backed implementation
//! of `pd_api::storage::PersistenceGateway`, the wire codec for
//! stores/regions (protobuf) and scheduler configs/rules (JSON), and the
//! cluster-unique id allocator built on top of the gateway.

pub mod codec;
pub mod id_allocator;
pub mod kv_gateway;

pub use id_allocator::StorageIdAllocator;
pub use kv_gateway::RedbKvGateway;
