//! HTTP API module
//!
//! JSON endpoints for managing the timer registry.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timers", get(list_timers_handler).post(create_timer_handler))
        .route("/timers/start-all", post(start_all_handler))
        .route("/timers/stop-all", post(stop_all_handler))
        .route("/timers/:name", get(get_timer_handler).delete(delete_timer_handler))
        .route("/timers/:name/start", post(start_timer_handler))
        .route("/timers/:name/stop", post(stop_timer_handler))
        .route("/timers/:name/duplicate", post(duplicate_timer_handler))
        .route("/export", get(export_handler))
        .route("/import", post(import_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
