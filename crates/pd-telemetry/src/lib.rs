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

//! # pd-telemetry
//!
//! Structured logging, the per-domain metrics sink traits, a
//! `prometheus`-backed implementation of them, and the `/metrics` /
//! `/healthz` / `/readyz` HTTP endpoint (SPEC_FULL.md §1.1, §1.5).

pub mod http;
pub mod init;
pub mod prometheus_sink;
pub mod sinks;

pub use init::init_tracing;
pub use sinks::{
    cluster_metrics, controller_metrics, scheduler_metrics, storage_metrics, tso_metrics, ClusterMetricsSink,
    ControllerMetricsSink, MetricsSink, NopSink, SchedulerMetricsSink, StorageMetricsSink, TsoMetricsSink, SINK,
};
