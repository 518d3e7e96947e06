//! Dead-stream configuration, profile and snapshot handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::automation::DeadStreamConfig;
use crate::models::ProfileId;
use crate::web::{
    AppState,
    responses::{handle_created, handle_error, handle_result},
};

pub async fn get_config(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.automation.dead_stream_config().await))
}

pub async fn update_config(State(state): State<AppState>, Json(config): Json<DeadStreamConfig>) -> Response {
    handle_result(state.automation.update_dead_stream_config(config).await)
}

pub async fn disable_empty_channels(State(state): State<AppState>) -> Response {
    handle_result(state.automation.disable_empty_channels().await)
}

pub async fn list_records(State(state): State<AppState>) -> Response {
    handle_result(state.automation.lifecycle_records().await)
}

pub async fn list_profiles(State(state): State<AppState>) -> Response {
    handle_result(state.automation.list_profiles().await)
}

pub async fn list_snapshots(State(state): State<AppState>) -> Response {
    handle_result(state.automation.list_snapshots().await)
}

pub async fn capture_snapshot(State(state): State<AppState>, Path(profile_id): Path<ProfileId>) -> Response {
    handle_created(state.automation.capture_snapshot(profile_id).await)
}

pub async fn get_snapshot(State(state): State<AppState>, Path(profile_id): Path<ProfileId>) -> Response {
    handle_result(state.automation.get_snapshot(profile_id).await)
}

pub async fn delete_snapshot(State(state): State<AppState>, Path(profile_id): Path<ProfileId>) -> Response {
    match state.automation.delete_snapshot(profile_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => handle_error(e),
    }
}
