//! API response structures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::TimerError, registry::LoadReport, timer::TimerSnapshot};

/// Response for endpoints that act on a timer
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerSnapshot>,
}

impl ApiResponse {
    pub fn new(status: &str, message: String, timer: Option<TimerSnapshot>) -> Self {
        Self {
            status: status.to_string(),
            message,
            timestamp: Utc::now(),
            timer,
        }
    }

    pub fn ok(message: String, timer: Option<TimerSnapshot>) -> Self {
        Self::new("ok", message, timer)
    }

    pub fn error(message: String) -> Self {
        Self::new("error", message, None)
    }
}

/// Response for bulk start/stop
#[derive(Debug, Clone, Serialize)]
pub struct BulkResponse {
    pub status: String,
    pub affected: usize,
    pub timestamp: DateTime<Utc>,
}

impl BulkResponse {
    pub fn ok(affected: usize) -> Self {
        Self {
            status: "ok".to_string(),
            affected,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of `POST /import`
#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    pub loaded: Vec<String>,
    pub failed: Vec<ImportFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub name: String,
    pub reason: String,
}

impl From<LoadReport> for ImportResponse {
    fn from(report: LoadReport) -> Self {
        Self {
            loaded: report.loaded,
            failed: report
                .failed
                .into_iter()
                .map(|(name, reason)| ImportFailure { name, reason })
                .collect(),
        }
    }
}

/// Server status with timer counts
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub timers: usize,
    pub running: usize,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub timers_file: Option<String>,
    pub autosave: bool,
    pub dry_run: bool,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error returned by handlers, rendered as an [`ApiResponse`]
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<TimerError> for ApiError {
    fn from(error: TimerError) -> Self {
        let status = match &error {
            TimerError::Validation { .. }
            | TimerError::Serialization { .. }
            | TimerError::Document(_) => StatusCode::BAD_REQUEST,
            TimerError::NotFound(_) => StatusCode::NOT_FOUND,
            TimerError::DuplicateName(_) => StatusCode::CONFLICT,
            TimerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::error(self.message))).into_response()
    }
}
