//! Scheduled event and auto-create rule handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::models::{AutoCreateRuleRequest, CreateScheduledEventRequest, RuleTestRequest};
use crate::web::{
    AppState,
    responses::{handle_created, handle_error, handle_result},
};

fn no_content(result: crate::errors::AppResult<()>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => handle_error(e),
    }
}

pub async fn list_events(State(state): State<AppState>) -> Response {
    handle_result(state.automation.list_events().await)
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateScheduledEventRequest>,
) -> Response {
    handle_created(state.automation.create_event(request).await)
}

pub async fn delete_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    no_content(state.automation.delete_event(id).await)
}

pub async fn list_rules(State(state): State<AppState>) -> Response {
    handle_result(state.automation.list_rules().await)
}

pub async fn get_rule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    handle_result(state.automation.get_rule(id).await)
}

pub async fn create_rule(State(state): State<AppState>, Json(request): Json<AutoCreateRuleRequest>) -> Response {
    handle_created(state.automation.create_rule(request).await)
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AutoCreateRuleRequest>,
) -> Response {
    handle_result(state.automation.update_rule(id, request).await)
}

pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    no_content(state.automation.delete_rule(id).await)
}

pub async fn test_rule(State(state): State<AppState>, Json(request): Json<RuleTestRequest>) -> Response {
    handle_result(state.automation.test_rule(request).await)
}

pub async fn regenerate_rules(State(state): State<AppState>) -> Response {
    handle_result(state.automation.regenerate_rules().await)
}
