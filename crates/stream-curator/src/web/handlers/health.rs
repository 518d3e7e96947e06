//! Health check HTTP handlers

use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::warn;

use crate::web::{
    AppState,
    responses::{HealthResponse, ok},
};

/// Basic application health including database connectivity
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.database.connection().ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => {
            warn!("Database health check failed: {}", e);
            "disconnected".to_string()
        }
    };

    ok(HealthResponse {
        status: if database == "connected" { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (Utc::now() - state.start_time).num_seconds(),
        database,
    })
}
