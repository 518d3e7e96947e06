//! Pipeline settings, triggers, queue and status handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::automation::settings::PipelineSettingsInput;
use crate::automation::{ChannelScope, ConcurrencyLimits, QueueLimits};
use crate::models::ChannelId;
use crate::web::{AppState, responses::handle_result};

#[derive(Debug, Deserialize)]
pub struct ScheduleUpdate {
    pub expression: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckParams {
    #[serde(default)]
    pub bypass_immunity: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoverRequest {
    /// Channels to match; every channel when absent
    #[serde(default)]
    pub channel_ids: Option<Vec<ChannelId>>,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub channel_ids: Vec<ChannelId>,
    #[serde(default)]
    pub bypass_immunity: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangelogParams {
    #[serde(default = "default_changelog_limit")]
    pub limit: u64,
}

fn default_changelog_limit() -> u64 {
    100
}

pub async fn get_pipeline(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.automation.pipeline_settings().await))
}

pub async fn update_pipeline(State(state): State<AppState>, Json(input): Json<PipelineSettingsInput>) -> Response {
    handle_result(state.automation.update_pipeline_settings(input).await)
}

pub async fn get_queue_limits(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.automation.queue_limits().await))
}

pub async fn update_queue_limits(State(state): State<AppState>, Json(limits): Json<QueueLimits>) -> Response {
    handle_result(state.automation.update_queue_limits(limits).await)
}

pub async fn get_concurrency(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.automation.concurrency_limits().await))
}

pub async fn update_concurrency(State(state): State<AppState>, Json(limits): Json<ConcurrencyLimits>) -> Response {
    handle_result(state.automation.update_concurrency_limits(limits).await)
}

pub async fn get_schedule(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.automation.global_schedule().await))
}

pub async fn update_schedule(State(state): State<AppState>, Json(update): Json<ScheduleUpdate>) -> Response {
    handle_result(state.automation.update_global_schedule(&update.expression).await)
}

pub async fn trigger_global_action(State(state): State<AppState>) -> Response {
    handle_result(state.automation.trigger_global_action().await)
}

pub async fn check_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Query(params): Query<CheckParams>,
) -> Response {
    handle_result(state.automation.check_channel(channel_id, params.bypass_immunity).await)
}

pub async fn discover_streams(State(state): State<AppState>, Json(request): Json<DiscoverRequest>) -> Response {
    let scope = match request.channel_ids {
        Some(ids) => ChannelScope::Channels(ids),
        None => ChannelScope::All,
    };
    handle_result(state.automation.discover_streams(scope).await)
}

pub async fn enqueue_channels(State(state): State<AppState>, Json(request): Json<EnqueueRequest>) -> Response {
    handle_result(
        state
            .automation
            .enqueue_channels(&request.channel_ids, request.bypass_immunity)
            .await,
    )
}

pub async fn list_queue(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.automation.list_queue().await))
}

pub async fn clear_queue(State(state): State<AppState>) -> Response {
    let removed = state.automation.clear_queue().await;
    handle_result(Ok(serde_json::json!({ "removed": removed })))
}

pub async fn get_status(State(state): State<AppState>) -> Response {
    handle_result(state.automation.status().await)
}

pub async fn recent_changelog(State(state): State<AppState>, Query(params): Query<ChangelogParams>) -> Response {
    handle_result(state.automation.recent_changelog(params.limit).await)
}
