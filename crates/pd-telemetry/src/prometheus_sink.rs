//! A concrete implementation of the metrics sinks using the `prometheus`
//! crate (SPEC_FULL.md §1.5), registered into the process-global default
//! registry `http::run_server`'s `/metrics` handler scrapes.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

static STORE_COUNT: OnceCell<IntGauge> = OnceCell::new();
static REGION_COUNT: OnceCell<IntGauge> = OnceCell::new();
static REGION_HEARTBEATS_ACCEPTED: OnceCell<IntCounter> = OnceCell::new();
static REGION_HEARTBEATS_REJECTED: OnceCell<IntCounter> = OnceCell::new();
static STORE_HEARTBEATS: OnceCell<IntCounter> = OnceCell::new();
static REGION_SIZE_BYTES: OnceCell<Histogram> = OnceCell::new();

static KV_OPS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static KV_OP_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static KV_RANGE_LIMIT: OnceCell<IntGauge> = OnceCell::new();

static CHECKER_OPERATORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SCHEDULER_OPERATORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SCHEDULER_SKIPS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static PATROL_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();

static RUNNING_OPERATORS: OnceCell<IntGauge> = OnceCell::new();
static OPERATOR_FINISHED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static OPERATOR_REJECTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static TSO_BATCH_SIZE: OnceCell<Histogram> = OnceCell::new();
static TSO_WATERMARK_PERSISTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static TSO_ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Panics if `install()` hasn't run yet — a missed `install()` call is a
/// startup bug, not a condition callers should have to handle.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric.get().expect("prometheus sink not initialized; call pd_telemetry::prometheus_sink::install() first")
    };
}

/// Registers every metric into the process-global default registry. Must be
/// called exactly once at startup, before any sink method runs.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    STORE_COUNT
        .set(register_int_gauge!("pd_store_count", "number of stores known to the cluster model")?)
        .expect("static already initialized");
    REGION_COUNT
        .set(register_int_gauge!("pd_region_count", "number of regions known to the cluster model")?)
        .expect("static already initialized");
    REGION_HEARTBEATS_ACCEPTED
        .set(register_int_counter!("pd_region_heartbeats_accepted_total", "accepted region heartbeats")?)
        .expect("static already initialized");
    REGION_HEARTBEATS_REJECTED
        .set(register_int_counter!("pd_region_heartbeats_rejected_total", "rejected (stale) region heartbeats")?)
        .expect("static already initialized");
    STORE_HEARTBEATS
        .set(register_int_counter!("pd_store_heartbeats_total", "store heartbeats processed")?)
        .expect("static already initialized");
    REGION_SIZE_BYTES
        .set(register_histogram!(
            "pd_region_size_bytes",
            "approximate size of regions observed on heartbeat"
        )?)
        .expect("static already initialized");

    KV_OPS_TOTAL
        .set(register_int_counter_vec!("pd_kv_ops_total", "persistence gateway operations", &["op"])?)
        .expect("static already initialized");
    KV_OP_DURATION_SECONDS
        .set(register_histogram_vec!(
            "pd_kv_op_duration_seconds",
            "persistence gateway operation latency",
            &["op"]
        )?)
        .expect("static already initialized");
    KV_RANGE_LIMIT
        .set(register_int_gauge!("pd_kv_range_limit", "current adaptive bulk-load range limit")?)
        .expect("static already initialized");

    CHECKER_OPERATORS_TOTAL
        .set(register_int_counter_vec!(
            "pd_checker_operators_total",
            "operators created by checkers",
            &["checker"]
        )?)
        .expect("static already initialized");
    SCHEDULER_OPERATORS_TOTAL
        .set(register_int_counter_vec!(
            "pd_scheduler_operators_total",
            "operators created by schedulers",
            &["scheduler"]
        )?)
        .expect("static already initialized");
    SCHEDULER_SKIPS_TOTAL
        .set(register_int_counter_vec!(
            "pd_scheduler_skips_total",
            "scheduler ticks skipped",
            &["scheduler", "reason"]
        )?)
        .expect("static already initialized");
    PATROL_DURATION_SECONDS
        .set(register_histogram!("pd_patrol_duration_seconds", "duration of one checker patrol pass")?)
        .expect("static already initialized");

    RUNNING_OPERATORS
        .set(register_int_gauge!("pd_running_operators", "operators currently dispatching")?)
        .expect("static already initialized");
    OPERATOR_FINISHED_TOTAL
        .set(register_int_counter_vec!(
            "pd_operator_finished_total",
            "operators that reached a terminal status",
            &["status"]
        )?)
        .expect("static already initialized");
    OPERATOR_REJECTED_TOTAL
        .set(register_int_counter_vec!(
            "pd_operator_rejected_total",
            "operators rejected at admission",
            &["reason"]
        )?)
        .expect("static already initialized");

    TSO_BATCH_SIZE
        .set(register_histogram!("pd_tso_batch_size", "timestamps allocated per TSO batch")?)
        .expect("static already initialized");
    TSO_WATERMARK_PERSISTED_TOTAL
        .set(register_int_counter!("pd_tso_watermark_persisted_total", "TSO watermark persist operations")?)
        .expect("static already initialized");
    TSO_ERRORS_TOTAL
        .set(register_int_counter_vec!("pd_tso_errors_total", "TSO oracle errors", &["reason"])?)
        .expect("static already initialized");

    Ok(&PrometheusSink)
}

impl ClusterMetricsSink for PrometheusSink {
    fn set_store_count(&self, count: i64) {
        get_metric!(STORE_COUNT).set(count);
    }
    fn set_region_count(&self, count: i64) {
        get_metric!(REGION_COUNT).set(count);
    }
    fn inc_region_heartbeat(&self, accepted: bool) {
        if accepted {
            get_metric!(REGION_HEARTBEATS_ACCEPTED).inc();
        } else {
            get_metric!(REGION_HEARTBEATS_REJECTED).inc();
        }
    }
    fn inc_store_heartbeat(&self) {
        get_metric!(STORE_HEARTBEATS).inc();
    }
    fn observe_region_size_bytes(&self, bytes: f64) {
        get_metric!(REGION_SIZE_BYTES).observe(bytes);
    }
}

impl StorageMetricsSink for PrometheusSink {
    fn inc_kv_op(&self, op: &'static str) {
        get_metric!(KV_OPS_TOTAL).with_label_values(&[op]).inc();
    }
    fn observe_kv_op_duration(&self, op: &'static str, duration_secs: f64) {
        get_metric!(KV_OP_DURATION_SECONDS).with_label_values(&[op]).observe(duration_secs);
    }
    fn set_range_limit(&self, limit: i64) {
        get_metric!(KV_RANGE_LIMIT).set(limit);
    }
}

impl SchedulerMetricsSink for PrometheusSink {
    fn inc_checker_operator_created(&self, checker: &'static str) {
        get_metric!(CHECKER_OPERATORS_TOTAL).with_label_values(&[checker]).inc();
    }
    fn inc_scheduler_operator_created(&self, scheduler: &'static str) {
        get_metric!(SCHEDULER_OPERATORS_TOTAL).with_label_values(&[scheduler]).inc();
    }
    fn inc_scheduler_skip(&self, scheduler: &'static str, reason: &'static str) {
        get_metric!(SCHEDULER_SKIPS_TOTAL).with_label_values(&[scheduler, reason]).inc();
    }
    fn observe_patrol_duration(&self, duration_secs: f64) {
        get_metric!(PATROL_DURATION_SECONDS).observe(duration_secs);
    }
}

impl ControllerMetricsSink for PrometheusSink {
    fn set_running_operator_count(&self, count: i64) {
        get_metric!(RUNNING_OPERATORS).set(count);
    }
    fn inc_operator_finished(&self, status: &'static str) {
        get_metric!(OPERATOR_FINISHED_TOTAL).with_label_values(&[status]).inc();
    }
    fn inc_operator_rejected(&self, reason: &'static str) {
        get_metric!(OPERATOR_REJECTED_TOTAL).with_label_values(&[reason]).inc();
    }
}

impl TsoMetricsSink for PrometheusSink {
    fn observe_batch_size(&self, size: f64) {
        get_metric!(TSO_BATCH_SIZE).observe(size);
    }
    fn inc_watermark_persisted(&self) {
        get_metric!(TSO_WATERMARK_PERSISTED_TOTAL).inc();
    }
    fn inc_tso_error(&self, reason: &'static str) {
        get_metric!(TSO_ERRORS_TOTAL).with_label_values(&[reason]).inc();
    }
}
