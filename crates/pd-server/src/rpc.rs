//! The admin/client wire surface (spec.md §6): JSON-over-HTTP, matching the
//! style the rest of this workspace already uses for its control-plane
//! surfaces rather than a hand-rolled binary protocol.
//!
//! A non-leader node never touches the cluster model or the timestamp
//! oracle here; it answers with the current lease holder's advertised
//! address so the caller can retry there (spec.md §4.J "continues to serve
//! read-only proxying").

use crate::heartbeat::StoreStatsReport;
use crate::leader::LeaderLifecycle;
use axum::{
    error_handling::HandleErrorLayer,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use pd_api::cluster::ClusterView;
use pd_api::controller::OperatorController;
use pd_api::storage::PersistenceGateway;
use pd_schedule::schedulers::{EvictLeaderScheduler, RandomMergeScheduler, ShuffleLeaderScheduler};
use pd_types::region::Region;
use pd_types::{RegionId, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub enum AppError {
    BadRequest(String),
    NotLeader { leader_addr: Option<String> },
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::http::StatusCode;
        let (status, code, message, leader_addr) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotLeader { leader_addr } => {
                (StatusCode::SERVICE_UNAVAILABLE, "NOT_LEADER", "this node is not the current leader".to_string(), leader_addr)
            }
            AppError::Internal(msg) => {
                tracing::error!(target: "pd_server", error = %msg, "rpc handler failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error".to_string(), None)
            }
        };
        (status, Json(serde_json::json!({ "error": { "code": code, "message": message, "leader_addr": leader_addr } }))).into_response()
    }
}

async fn not_leader(lifecycle: &LeaderLifecycle) -> AppError {
    AppError::NotLeader { leader_addr: lifecycle.current_leader_addr().await }
}

async fn region_heartbeat(State(lifecycle): State<Arc<LeaderLifecycle>>, Json(region): Json<Region>) -> Result<Json<serde_json::Value>, AppError> {
    let ingest = match lifecycle.heartbeat_ingest() {
        Some(ingest) => ingest,
        None => return Err(not_leader(&lifecycle).await),
    };
    let step = ingest.region_heartbeat(region).await.map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(Json(serde_json::json!({ "next_step": step })))
}

#[derive(Debug, Deserialize)]
struct StoreHeartbeatRequest {
    store_id: u64,
    #[serde(flatten)]
    report: StoreStatsReportWire,
}

#[derive(Debug, Deserialize)]
struct StoreStatsReportWire {
    capacity_bytes: u64,
    used_bytes: u64,
    available_bytes: u64,
    sending_snap_count: u32,
    receiving_snap_count: u32,
    applying_snap_count: u32,
    is_busy: bool,
}

impl From<StoreStatsReportWire> for StoreStatsReport {
    fn from(w: StoreStatsReportWire) -> Self {
        StoreStatsReport {
            capacity_bytes: w.capacity_bytes,
            used_bytes: w.used_bytes,
            available_bytes: w.available_bytes,
            sending_snap_count: w.sending_snap_count,
            receiving_snap_count: w.receiving_snap_count,
            applying_snap_count: w.applying_snap_count,
            is_busy: w.is_busy,
        }
    }
}

async fn store_heartbeat(
    State(lifecycle): State<Arc<LeaderLifecycle>>,
    Json(req): Json<StoreHeartbeatRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ingest = match lifecycle.heartbeat_ingest() {
        Some(ingest) => ingest,
        None => return Err(not_leader(&lifecycle).await),
    };
    ingest
        .store_heartbeat(StoreId::new(req.store_id), req.report.into())
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct TsoAllocRequest {
    count: u32,
}

#[derive(Debug, Serialize)]
struct TsoAllocResponse {
    physical_ms: u64,
    logical: u64,
}

async fn tso_alloc(State(lifecycle): State<Arc<LeaderLifecycle>>, Json(req): Json<TsoAllocRequest>) -> Result<Json<TsoAllocResponse>, AppError> {
    let tso = match lifecycle.tso() {
        Some(tso) => tso,
        None => return Err(not_leader(&lifecycle).await),
    };
    let ts = pd_api::tso::TimestampOracle::alloc_timestamps(tso.as_ref(), req.count)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(TsoAllocResponse { physical_ms: ts.physical_ms, logical: ts.logical }))
}

async fn leader_info(State(lifecycle): State<Arc<LeaderLifecycle>>) -> Json<serde_json::Value> {
    let leader_addr = lifecycle.current_leader_addr().await;
    Json(serde_json::json!({ "leader_addr": leader_addr }))
}

/// A JSON-friendly view of a [`Store`](pd_types::store::Store): the type
/// itself carries rate limiters and a moving-average filter that don't
/// derive `Serialize`.
#[derive(Debug, Serialize)]
struct StoreView {
    id: u64,
    address: String,
    labels: std::collections::BTreeMap<String, String>,
    state: pd_types::store::StoreState,
    available_bytes: u64,
    capacity_bytes: u64,
    used_bytes: u64,
    region_count: u32,
    leader_count: u32,
    pending_peer_count: u32,
    learner_count: u32,
    region_size: u64,
    leader_size: u64,
    sending_snap_count: u32,
    receiving_snap_count: u32,
    applying_snap_count: u32,
    is_busy: bool,
    seconds_since_heartbeat: u64,
}

fn store_view(store: &pd_types::store::Store) -> StoreView {
    StoreView {
        id: store.id.get(),
        address: store.address.clone(),
        labels: store.labels.clone(),
        state: store.state,
        available_bytes: store.available_bytes(),
        capacity_bytes: store.capacity_bytes,
        used_bytes: store.used_bytes,
        region_count: store.region_count,
        leader_count: store.leader_count,
        pending_peer_count: store.pending_peer_count,
        learner_count: store.learner_count,
        region_size: store.region_size,
        leader_size: store.leader_size,
        sending_snap_count: store.sending_snap_count,
        receiving_snap_count: store.receiving_snap_count,
        applying_snap_count: store.applying_snap_count,
        is_busy: store.is_busy,
        seconds_since_heartbeat: store.seconds_since_heartbeat(),
    }
}

async fn list_stores(State(lifecycle): State<Arc<LeaderLifecycle>>) -> Json<Vec<StoreView>> {
    Json(lifecycle.cluster().all_stores().iter().map(store_view).collect())
}

async fn get_store(State(lifecycle): State<Arc<LeaderLifecycle>>, Path(id): Path<u64>) -> Result<Json<StoreView>, AppError> {
    lifecycle
        .cluster()
        .get_store(StoreId::new(id))
        .map(|store| Json(store_view(&store)))
        .ok_or_else(|| AppError::BadRequest(format!("store {id} not found")))
}

#[derive(Debug, Deserialize)]
struct RegionListQuery {
    #[serde(default)]
    limit: usize,
}

async fn list_regions(State(lifecycle): State<Arc<LeaderLifecycle>>, Query(q): Query<RegionListQuery>) -> Json<Vec<Region>> {
    Json(lifecycle.cluster().scan_range(&[], &[], q.limit))
}

async fn get_region(State(lifecycle): State<Arc<LeaderLifecycle>>, Path(id): Path<u64>) -> Result<Json<Region>, AppError> {
    lifecycle
        .cluster()
        .get_region(RegionId::new(id))
        .map(Json)
        .ok_or_else(|| AppError::BadRequest(format!("region {id} not found")))
}

#[derive(Debug, Deserialize)]
struct RegionKeyQuery {
    key: String,
}

/// Accepts either a raw UTF-8 key or a protobuf-text-escaped byte string
/// (`\NNN` octal escapes), matching the admin CLI's `region key` sub-command
/// (spec.md §6).
fn decode_key_arg(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) {
            let octal = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("0");
            let value = u8::from_str_radix(octal, 8).unwrap_or(0);
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

async fn get_region_by_key(State(lifecycle): State<Arc<LeaderLifecycle>>, Query(q): Query<RegionKeyQuery>) -> Result<Json<Region>, AppError> {
    let key = decode_key_arg(&q.key);
    lifecycle.cluster().get_region_by_key(&key).map(Json).ok_or_else(|| AppError::BadRequest("no region covers that key".to_string()))
}

async fn get_config(State(lifecycle): State<Arc<LeaderLifecycle>>) -> Json<pd_types::config::PdConfig> {
    Json(lifecycle.config().read().clone())
}

async fn put_config(
    State(lifecycle): State<Arc<LeaderLifecycle>>,
    Json(patch): Json<HashMap<String, serde_json::Value>>,
) -> Result<Json<pd_types::config::PdConfig>, AppError> {
    let config = lifecycle.config();
    let mut current = serde_json::to_value(config.read().clone()).map_err(|e| AppError::Internal(e.to_string()))?;
    if let serde_json::Value::Object(map) = &mut current {
        for (k, v) in patch {
            map.insert(k, v);
        }
    }
    let updated: pd_types::config::PdConfig = serde_json::from_value(current).map_err(|e| AppError::BadRequest(e.to_string()))?;
    *config.write() = updated.clone();
    Ok(Json(updated))
}

async fn list_schedulers(State(lifecycle): State<Arc<LeaderLifecycle>>) -> Json<Vec<String>> {
    Json(lifecycle.schedulers().names())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum AddSchedulerRequest {
    EvictLeader { store_id: u64 },
    ShuffleLeader { seed: u64 },
    RandomMerge { seed: u64 },
}

async fn add_scheduler(State(lifecycle): State<Arc<LeaderLifecycle>>, Json(req): Json<AddSchedulerRequest>) -> Json<serde_json::Value> {
    let scheduler: Arc<dyn pd_api::scheduling::Scheduler> = match req {
        AddSchedulerRequest::EvictLeader { store_id } => Arc::new(EvictLeaderScheduler::new(StoreId::new(store_id))),
        AddSchedulerRequest::ShuffleLeader { seed } => Arc::new(ShuffleLeaderScheduler::new(seed)),
        AddSchedulerRequest::RandomMerge { seed } => Arc::new(RandomMergeScheduler::new(seed)),
    };
    lifecycle.schedulers().add(scheduler);
    Json(serde_json::json!({ "ok": true }))
}

async fn remove_scheduler(State(lifecycle): State<Arc<LeaderLifecycle>>, Path(name): Path<String>) -> Json<serde_json::Value> {
    let removed = lifecycle.schedulers().remove(&name);
    Json(serde_json::json!({ "removed": removed }))
}

/// A JSON-friendly view of an [`Operator`](pd_types::operator::Operator):
/// the type itself carries an atomic status cell and raw `SystemTime`
/// fields that don't derive `Serialize`.
#[derive(Debug, Serialize)]
struct OperatorView {
    description: String,
    region_id: u64,
    kind: pd_types::operator::OperatorKind,
    steps: Vec<pd_types::operator::OperatorStep>,
    step_index: usize,
    status: &'static str,
    priority: pd_types::operator::OperatorPriority,
}

fn operator_view(op: &pd_types::operator::Operator) -> OperatorView {
    use pd_types::operator::OperatorStatus;
    let status = match op.status.load() {
        OperatorStatus::Created => "created",
        OperatorStatus::Started => "started",
        OperatorStatus::Success => "success",
        OperatorStatus::Timeout => "timeout",
        OperatorStatus::Cancelled => "cancelled",
        OperatorStatus::Replaced => "replaced",
        OperatorStatus::Expired => "expired",
    };
    OperatorView {
        description: op.description.clone(),
        region_id: op.region_id.get(),
        kind: op.kind,
        steps: op.steps.clone(),
        step_index: op.step_index,
        status,
        priority: op.priority,
    }
}

async fn list_operators(State(lifecycle): State<Arc<LeaderLifecycle>>) -> Result<Json<Vec<OperatorView>>, AppError> {
    let controller = lifecycle.operator_controller().ok_or_else(|| AppError::NotLeader { leader_addr: None })?;
    Ok(Json(controller.list_operators().iter().map(operator_view).collect()))
}

async fn get_operator(State(lifecycle): State<Arc<LeaderLifecycle>>, Path(id): Path<u64>) -> Result<Json<OperatorView>, AppError> {
    let controller = lifecycle.operator_controller().ok_or_else(|| AppError::NotLeader { leader_addr: None })?;
    controller
        .get_operator(RegionId::new(id))
        .map(|op| Json(operator_view(&op)))
        .ok_or_else(|| AppError::BadRequest(format!("no operator running on region {id}")))
}

async fn cancel_operator(State(lifecycle): State<Arc<LeaderLifecycle>>, Path(id): Path<u64>) -> Result<Json<serde_json::Value>, AppError> {
    let controller = lifecycle.operator_controller().ok_or_else(|| AppError::NotLeader { leader_addr: None })?;
    controller.remove_operator(RegionId::new(id));
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct CreateNamespaceRequest {
    namespace: String,
    table_id: u64,
}

async fn create_namespace(
    State(lifecycle): State<Arc<LeaderLifecycle>>,
    Json(req): Json<CreateNamespaceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if lifecycle.heartbeat_ingest().is_none() {
        return Err(not_leader(&lifecycle).await);
    }
    let bytes = serde_json::to_vec(&req.table_id).map_err(|e| AppError::Internal(e.to_string()))?;
    lifecycle
        .gateway()
        .save(&pd_types::keys::namespace_key(&req.namespace), &bytes)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "ok": true, "namespace": req.namespace, "table_id": req.table_id })))
}

async fn handle_service_error(err: BoxError) -> (axum::http::StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (axum::http::StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled internal error: {err}"))
    }
}

pub fn router(lifecycle: Arc<LeaderLifecycle>) -> Router {
    Router::new()
        .route("/v1/region-heartbeat", post(region_heartbeat))
        .route("/v1/store-heartbeat", post(store_heartbeat))
        .route("/v1/tso/alloc", post(tso_alloc))
        .route("/v1/leader", get(leader_info))
        .route("/v1/stores", get(list_stores))
        .route("/v1/stores/:id", get(get_store))
        .route("/v1/regions", get(list_regions))
        .route("/v1/regions/:id", get(get_region))
        .route("/v1/regions/by-key", get(get_region_by_key))
        .route("/v1/config", get(get_config).put(put_config))
        .route("/v1/schedulers", get(list_schedulers).post(add_scheduler))
        .route("/v1/schedulers/:name", delete(remove_scheduler))
        .route("/v1/operators", get(list_operators))
        .route("/v1/operators/:id", get(get_operator).delete(cancel_operator))
        .route("/v1/namespaces", post(create_namespace))
        .with_state(lifecycle)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_service_error))
                .layer(TraceLayer::new_for_http())
                .load_shed()
                .concurrency_limit(256)
                .timeout(Duration::from_secs(10)),
        )
}

pub async fn serve(addr: SocketAddr, lifecycle: Arc<LeaderLifecycle>) {
    let app = router(lifecycle);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target: "pd_server", error = %e, "failed to bind rpc listener");
            return;
        }
    };
    tracing::info!(target: "pd_server", addr = %addr, "rpc surface listening");
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        tracing::error!(target: "pd_server", error = %e, "rpc server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::operator::{Operator, OperatorKind, OperatorPriority};

    #[test]
    fn decode_key_arg_passes_plain_bytes_through() {
        assert_eq!(decode_key_arg("abc"), b"abc".to_vec());
    }

    #[test]
    fn decode_key_arg_unescapes_octal_sequences() {
        assert_eq!(decode_key_arg("\\141\\142"), b"ab".to_vec());
    }

    #[test]
    fn decode_key_arg_mixes_literal_and_escaped_bytes() {
        assert_eq!(decode_key_arg("t\\000\\001"), vec![b't', 0, 1]);
    }

    #[test]
    fn store_view_reports_the_smoothed_available_figure() {
        let mut store = pd_types::store::Store::new(StoreId::new(1), "127.0.0.1:20160");
        store.observe_available(1024);
        let view = store_view(&store);
        assert_eq!(view.id, 1);
        assert_eq!(view.available_bytes, store.available_bytes());
    }

    #[test]
    fn operator_view_reports_the_loaded_status_as_text() {
        let op = Operator::new(
            "test".to_string(),
            RegionId::new(1),
            pd_types::epoch::RegionEpoch::default(),
            OperatorKind::REGION,
            vec![],
            OperatorPriority::Normal,
        );
        assert_eq!(operator_view(&op).status, "created");
    }
}
