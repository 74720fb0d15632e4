use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    http::{header::CONTENT_TYPE, HeaderName, StatusCode},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error=%e, "failed to encode prometheus metrics");
    }
    ([(CONTENT_TYPE, encoder.format_type().to_string())], buf.into())
}

async fn healthz_handler() -> &'static str {
    "OK"
}

/// Readiness tracks whether this node currently holds cluster leadership
/// (spec.md §4.J): a non-leader still answers `/healthz` but should fail
/// readiness so it drops out of any load balancer rotation expecting a
/// writable endpoint.
async fn readyz_handler(axum::extract::State(is_leader): axum::extract::State<std::sync::Arc<std::sync::atomic::AtomicBool>>) -> (StatusCode, &'static str) {
    if is_leader.load(std::sync::atomic::Ordering::Relaxed) {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not leader")
    }
}

async fn handle_service_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled internal error: {err}"))
    }
}

/// Serves `/metrics`, `/healthz`, `/readyz` until a ctrl-c signal arrives,
/// then shuts down gracefully.
pub async fn run_server(addr: SocketAddr, is_leader: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(is_leader)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_service_error))
                .layer(TraceLayer::new_for_http())
                .load_shed()
                .concurrency_limit(8)
                .timeout(Duration::from_secs(2)),
        );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target = "pd_telemetry", error = %e, "failed to bind telemetry http server");
            return;
        }
    };
    let bound_addr = match listener.local_addr() {
        Ok(a) => a,
        Err(_) => addr,
    };
    tracing::info!(target = "pd_telemetry", addr = %bound_addr, "listening");

    let graceful = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(target = "pd_telemetry", error = %e, "failed to install ctrl-c handler");
        }
        tracing::info!(target = "pd_telemetry", "shutting down gracefully");
    });

    if let Err(e) = graceful.await {
        tracing::error!(target = "pd_telemetry", error = %e, "server error");
    }
}
