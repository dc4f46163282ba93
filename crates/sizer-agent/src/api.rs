//! HTTP API for profiling runs, bulk campaigns, health, and metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use sizer_lib::{BulkRunner, PortMapping, RunManager, RunSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RunManager>,
    pub bulk: Arc<BulkRunner>,
    pub default_duration_secs: u64,
}

impl AppState {
    pub fn new(manager: Arc<RunManager>, bulk: Arc<BulkRunner>, default_duration_secs: u64) -> Self {
        Self {
            manager,
            bulk,
            default_duration_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub image: String,
    /// Omitted: the configured default applies. Explicit `0`: monitor
    /// until manually stopped.
    pub duration_secs: Option<u64>,
    pub command: Option<Vec<String>>,
    pub ports: Option<Vec<PortMapping>>,
}

#[derive(Debug, Serialize)]
struct StartRunResponse {
    run_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub images: Option<Vec<String>>,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: message.into(),
    })
}

/// Start a profiling run; returns 202 with the run identifier.
async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> impl IntoResponse {
    if request.image.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("image must not be empty")).into_response();
    }

    let duration = match request.duration_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(Duration::from_secs(state.default_duration_secs)),
    };

    let spec = RunSpec::new(request.image, duration)
        .with_command(request.command)
        .with_ports(request.ports);
    let run_id = state.manager.start_run(spec);

    (StatusCode::ACCEPTED, Json(StartRunResponse { run_id })).into_response()
}

/// Live view of a run: state, latest sample, running aggregate.
async fn poll_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.manager.poll_run(&id).await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => (StatusCode::NOT_FOUND, error_body(format!("unknown run: {id}"))).into_response(),
    }
}

/// Request a manual stop and return the finalized record.
async fn stop_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.manager.stop_run(&id).await {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => (StatusCode::NOT_FOUND, error_body(format!("unknown run: {id}"))).into_response(),
    }
}

/// Final result of a terminal run. 409 while the run is still in flight.
async fn run_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Some(record) = state.manager.get_result(&id).await {
        return (StatusCode::OK, Json(record)).into_response();
    }
    match state.manager.poll_run(&id).await {
        Some(snapshot) => (
            StatusCode::CONFLICT,
            error_body(format!("run {id} still in state {}", snapshot.state)),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, error_body(format!("unknown run: {id}"))).into_response(),
    }
}

/// Tail of the profiled container's logs.
async fn run_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let tail = query.tail.unwrap_or(100);
    match state.manager.logs(&id, tail).await {
        Ok(logs) => (StatusCode::OK, logs).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, error_body(err.to_string())).into_response(),
    }
}

async fn list_runs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.list_runs())
}

/// Evict finished runs from the registry once their results have been
/// collected, keeping long-lived agents from accumulating records.
async fn prune_runs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let evicted = state.manager.prune_terminal().await;
    Json(serde_json::json!({ "evicted": evicted }))
}

/// Kick off a bulk campaign; 409 when one is already running.
async fn start_bulk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkRequest>,
) -> impl IntoResponse {
    let duration = Duration::from_secs(
        request.duration_secs.unwrap_or(state.default_duration_secs),
    );
    if state.bulk.start(request.images, duration).await {
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "started" })),
        )
            .into_response()
    } else {
        (
            StatusCode::CONFLICT,
            error_body("a bulk campaign is already running"),
        )
            .into_response()
    }
}

async fn bulk_progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.bulk.progress().await)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/runs", post(start_run).get(list_runs))
        .route("/api/v1/runs/prune", post(prune_runs))
        .route("/api/v1/runs/:id", get(poll_run))
        .route("/api/v1/runs/:id/stop", post(stop_run))
        .route("/api/v1/runs/:id/result", get(run_result))
        .route("/api/v1/runs/:id/logs", get(run_logs))
        .route("/api/v1/bulk", post(start_bulk))
        .route("/api/v1/bulk/progress", get(bulk_progress))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
