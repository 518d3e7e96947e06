//! HTTP response types and error mapping
//!
//! Every endpoint answers with the [`ApiResponse`] envelope. Errors are mapped
//! to status codes in [`handle_error`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::automation::AutomationError;
use crate::errors::{AppError, AppResult};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// Convert an `AppResult` into a `200 OK` envelope or a mapped error
pub fn handle_result<T>(result: AppResult<T>) -> Response
where
    T: Serialize,
{
    match result {
        Ok(data) => ok(data).into_response(),
        Err(error) => handle_error(error),
    }
}

/// Like [`handle_result`] but answers `201 Created` on success
pub fn handle_created<T>(result: AppResult<T>) -> Response
where
    T: Serialize,
{
    match result {
        Ok(data) => created(data).into_response(),
        Err(error) => handle_error(error),
    }
}

/// Map an error to its status code and message
pub fn error_status(error: &AppError) -> (StatusCode, String) {
    match error {
        AppError::Automation(automation) => match automation {
            AutomationError::QueueFull { .. } => (StatusCode::TOO_MANY_REQUESTS, automation.to_string()),
            AutomationError::InvalidRule { .. } | AutomationError::ConfigConflict { .. } => {
                (StatusCode::BAD_REQUEST, automation.to_string())
            }
            AutomationError::UpstreamUnavailable { .. } => (StatusCode::BAD_GATEWAY, automation.to_string()),
            AutomationError::ProbeTimeout { .. } | AutomationError::ProbeFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, automation.to_string())
            }
        },
        AppError::Validation { message } => (StatusCode::BAD_REQUEST, message.clone()),
        AppError::NotFound { resource, id } => (
            StatusCode::NOT_FOUND,
            format!("{} with id '{}' not found", resource, id),
        ),
        AppError::Http(_) => (
            StatusCode::BAD_GATEWAY,
            "External service communication failed".to_string(),
        ),
        AppError::Database(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database operation failed".to_string(),
        ),
        AppError::Json(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stored data could not be decoded".to_string(),
        ),
        AppError::Configuration { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Configuration error: {}", message),
        ),
        AppError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {}", message),
        ),
    }
}

/// Convert an `AppError` to an HTTP response
pub fn handle_error(error: AppError) -> Response {
    let (status, message) = error_status(&error);
    if status.is_server_error() {
        error!("Request failed: {}", error);
    } else {
        warn!("Request rejected ({}): {}", status, error);
    }
    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub database: String,
}
