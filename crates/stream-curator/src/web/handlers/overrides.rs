//! Channel and group override handlers

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};

use crate::models::{ChannelId, GroupId, ModeOverride};
use crate::web::{AppState, responses::handle_result};

pub async fn get_channel_settings(State(state): State<AppState>, Path(channel_id): Path<ChannelId>) -> Response {
    handle_result(state.automation.channel_settings(channel_id).await)
}

pub async fn set_channel_override(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Json(value): Json<ModeOverride>,
) -> Response {
    handle_result(state.automation.set_channel_override(channel_id, value).await)
}

pub async fn get_group_override(State(state): State<AppState>, Path(group_id): Path<GroupId>) -> Response {
    handle_result(state.automation.group_override(group_id).await)
}

pub async fn set_group_override(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    Json(value): Json<ModeOverride>,
) -> Response {
    handle_result(state.automation.set_group_override(group_id, value).await)
}
