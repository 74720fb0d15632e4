//! Abstract traits for metrics reporting, decoupling core logic from the
//! backend (SPEC_FULL.md §1.5).

use once_cell::sync::OnceCell;

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink`
/// implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

pub fn cluster_metrics() -> &'static dyn ClusterMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

pub fn storage_metrics() -> &'static dyn StorageMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

pub fn scheduler_metrics() -> &'static dyn SchedulerMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

pub fn controller_metrics() -> &'static dyn ControllerMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

pub fn tso_metrics() -> &'static dyn TsoMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Metrics for the cluster model (spec.md §4.A): store/region inventory and
/// heartbeat ingest.
pub trait ClusterMetricsSink: Send + Sync + std::fmt::Debug {
    fn set_store_count(&self, count: i64);
    fn set_region_count(&self, count: i64);
    fn inc_region_heartbeat(&self, accepted: bool);
    fn inc_store_heartbeat(&self);
    fn observe_region_size_bytes(&self, bytes: f64);
}
impl ClusterMetricsSink for NopSink {
    fn set_store_count(&self, _count: i64) {}
    fn set_region_count(&self, _count: i64) {}
    fn inc_region_heartbeat(&self, _accepted: bool) {}
    fn inc_store_heartbeat(&self) {}
    fn observe_region_size_bytes(&self, _bytes: f64) {}
}

/// Metrics for the persistence gateway (spec.md §4.B).
pub trait StorageMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_kv_op(&self, op: &'static str);
    fn observe_kv_op_duration(&self, op: &'static str, duration_secs: f64);
    fn set_range_limit(&self, limit: i64);
}
impl StorageMetricsSink for NopSink {
    fn inc_kv_op(&self, _op: &'static str) {}
    fn observe_kv_op_duration(&self, _op: &'static str, _duration_secs: f64) {}
    fn set_range_limit(&self, _limit: i64) {}
}

/// Metrics for checkers and schedulers (spec.md §4.F/§4.G).
pub trait SchedulerMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_checker_operator_created(&self, checker: &'static str);
    fn inc_scheduler_operator_created(&self, scheduler: &'static str);
    fn inc_scheduler_skip(&self, scheduler: &'static str, reason: &'static str);
    fn observe_patrol_duration(&self, duration_secs: f64);
}
impl SchedulerMetricsSink for NopSink {
    fn inc_checker_operator_created(&self, _checker: &'static str) {}
    fn inc_scheduler_operator_created(&self, _scheduler: &'static str) {}
    fn inc_scheduler_skip(&self, _scheduler: &'static str, _reason: &'static str) {}
    fn observe_patrol_duration(&self, _duration_secs: f64) {}
}

/// Metrics for the operator controller (spec.md §4.H).
pub trait ControllerMetricsSink: Send + Sync + std::fmt::Debug {
    fn set_running_operator_count(&self, count: i64);
    fn inc_operator_finished(&self, status: &'static str);
    fn inc_operator_rejected(&self, reason: &'static str);
}
impl ControllerMetricsSink for NopSink {
    fn set_running_operator_count(&self, _count: i64) {}
    fn inc_operator_finished(&self, _status: &'static str) {}
    fn inc_operator_rejected(&self, _reason: &'static str) {}
}

/// Metrics for the TSO oracle (spec.md §4.I).
pub trait TsoMetricsSink: Send + Sync + std::fmt::Debug {
    fn observe_batch_size(&self, size: f64);
    fn inc_watermark_persisted(&self);
    fn inc_tso_error(&self, reason: &'static str);
}
impl TsoMetricsSink for NopSink {
    fn observe_batch_size(&self, _size: f64) {}
    fn inc_watermark_persisted(&self) {}
    fn inc_tso_error(&self, _reason: &'static str) {}
}

/// A unified sink implementing every domain trait, so a single Prometheus
/// backend can be installed once at startup.
pub trait MetricsSink:
    ClusterMetricsSink + StorageMetricsSink + SchedulerMetricsSink + ControllerMetricsSink + TsoMetricsSink
{
}

impl<T> MetricsSink for T where
    T: ClusterMetricsSink + StorageMetricsSink + SchedulerMetricsSink + ControllerMetricsSink + TsoMetricsSink
{
}
