use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_types::Entity;
use parley_types::access::{require_admin, require_member};
use parley_types::api::{ChannelNameRequest, Claims, IdResponse};
use parley_types::events::FeedEvent;
use parley_types::models::Channel;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_channels(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channels = state
        .blocking(move |db| {
            require_member(db.get_member_by_user(workspace_id, claims.sub)?)?;
            Ok(db.list_channels(workspace_id)?)
        })
        .await?;
    Ok(Json(channels))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state
        .blocking(move |db| {
            let channel = db
                .get_channel(channel_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Channel))?;
            require_member(db.get_member_by_user(channel.workspace_id, claims.sub)?)?;
            Ok(channel)
        })
        .await?;
    Ok(Json(channel))
}

/// POST /workspaces/{id}/channels (admin)
pub async fn create_channel(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChannelNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = Channel {
        id: Uuid::new_v4(),
        workspace_id,
        name: Channel::normalize_name(&req.name)?,
        created_at: Utc::now(),
    };

    let created = channel.clone();
    state
        .blocking(move |db| {
            require_admin(db.get_member_by_user(workspace_id, claims.sub)?)?;
            Ok(db.create_channel(&created)?)
        })
        .await?;

    info!("{} created channel #{} in {}", claims.sub, channel.name, workspace_id);
    Ok((StatusCode::CREATED, Json(channel)))
}

/// PATCH /channels/{id} (admin)
pub async fn rename_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChannelNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = Channel::normalize_name(&req.name)?;
    let channel = state
        .blocking(move |db| {
            let mut channel = db
                .get_channel(channel_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Channel))?;
            require_admin(db.get_member_by_user(channel.workspace_id, claims.sub)?)?;
            db.rename_channel(channel_id, &name)?;
            channel.name = name;
            Ok(channel)
        })
        .await?;
    Ok(Json(channel))
}

/// DELETE /channels/{id} (admin): the channel's messages go with it.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state
        .blocking(move |db| {
            let channel = db
                .get_channel(channel_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Channel))?;
            require_admin(db.get_member_by_user(channel.workspace_id, claims.sub)?)?;
            db.delete_channel(channel_id)?;
            Ok(channel)
        })
        .await?;

    info!("{} deleted channel #{}", claims.sub, channel.name);
    state.dispatcher.publish(FeedEvent::ChannelDeleted {
        workspace_id: channel.workspace_id,
        channel_id,
    });
    Ok(Json(IdResponse { id: channel_id }))
}
