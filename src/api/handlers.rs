//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{error::TimerError, state::AppState, timer::{TimerSnapshot, TimerSpec}};
use super::responses::{
    ApiError, ApiResponse, BulkResponse, HealthResponse, ImportResponse, StatusResponse,
};

type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /timers`: a name plus the persisted timer fields
#[derive(Debug, Deserialize)]
pub struct CreateTimerRequest {
    pub name: String,
    #[serde(flatten)]
    pub timer: Map<String, Value>,
}

/// Handle GET /timers - Snapshots of every timer
pub async fn list_timers_handler(State(state): State<Arc<AppState>>) -> Json<Vec<TimerSnapshot>> {
    Json(state.registry.snapshots())
}

/// Handle POST /timers - Create a timer
pub async fn create_timer_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTimerRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let spec: TimerSpec = serde_json::from_value(Value::Object(request.timer)).map_err(|e| {
        TimerError::Serialization {
            name: request.name.clone(),
            reason: e.to_string(),
        }
    })?;

    let engine = state.registry.create(&request.name, spec)?;
    state.record_action(format!("create {}", request.name));
    info!("Created {} timer {} via API", engine.mode(), request.name);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            format!("Timer {} created", request.name),
            Some(engine.snapshot()),
        )),
    ))
}

/// Handle GET /timers/:name
pub async fn get_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<TimerSnapshot>> {
    let engine = state.registry.get(&name).ok_or(TimerError::NotFound(name))?;
    Ok(Json(engine.snapshot()))
}

/// Handle DELETE /timers/:name - Stop and remove a timer
pub async fn delete_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApiResponse>> {
    state.registry.remove(&name).await?;
    state.record_action(format!("remove {}", name));
    Ok(Json(ApiResponse::ok(format!("Timer {} removed", name), None)))
}

/// Handle POST /timers/:name/start
pub async fn start_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApiResponse>> {
    let started = state.registry.start(&name)?;
    state.record_action(format!("start {}", name));

    let message = if started {
        format!("Timer {} started", name)
    } else {
        warn!("Start requested for running timer {}", name);
        format!("Timer {} is already running", name)
    };
    let snapshot = state.registry.get(&name).map(|engine| engine.snapshot());
    Ok(Json(ApiResponse::ok(message, snapshot)))
}

/// Handle POST /timers/:name/stop
pub async fn stop_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApiResponse>> {
    state.registry.stop(&name).await?;
    state.record_action(format!("stop {}", name));

    let snapshot = state.registry.get(&name).map(|engine| engine.snapshot());
    Ok(Json(ApiResponse::ok(format!("Timer {} stopped", name), snapshot)))
}

/// Handle POST /timers/:name/duplicate
pub async fn duplicate_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let copy = state.registry.duplicate(&name)?;
    state.record_action(format!("duplicate {}", name));

    let snapshot = state.registry.get(&copy).map(|engine| engine.snapshot());
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(format!("Timer {} duplicated as {}", name, copy), snapshot)),
    ))
}

/// Handle POST /timers/start-all
pub async fn start_all_handler(State(state): State<Arc<AppState>>) -> Json<BulkResponse> {
    let started = state.registry.start_all();
    state.record_action("start-all");
    Json(BulkResponse::ok(started))
}

/// Handle POST /timers/stop-all
pub async fn stop_all_handler(State(state): State<Arc<AppState>>) -> Json<BulkResponse> {
    let running = state.registry.snapshots().iter().filter(|s| s.running).count();
    state.registry.stop_all().await;
    state.record_action("stop-all");
    Json(BulkResponse::ok(running))
}

/// Handle GET /export - The registry as a persisted document
pub async fn export_handler(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let text = state.registry.to_text()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], text))
}

/// Handle POST /import - Register every valid entry of a document
pub async fn import_handler(
    State(state): State<Arc<AppState>>,
    body: String,
) -> ApiResult<Json<ImportResponse>> {
    if body.trim().is_empty() {
        return Err(ApiError::bad_request("empty timer document"));
    }

    let report = state.registry.load_text(&body)?;
    state.record_action("import");
    Ok(Json(report.into()))
}

/// Handle GET /status - Return current server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshots = state.registry.snapshots();
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timers: snapshots.len(),
        running: snapshots.iter().filter(|s| s.running).count(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        timers_file: state.timers_file.as_ref().map(|p| p.display().to_string()),
        autosave: state.autosave,
        dry_run: state.registry.executor().is_dry_run(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
