use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::access::require_member;
use parley_types::api::{Claims, OpenConversationRequest};
use parley_types::{ChatError, DomainRule, Entity};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /workspaces/{id}/conversations: get or create the 1:1 conversation
/// between the caller and another member.
pub async fn open_conversation(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .blocking(move |db| {
            let me = require_member(db.get_member_by_user(workspace_id, claims.sub)?)?;
            let other = db
                .get_member(req.member_id)?
                .filter(|m| m.workspace_id == workspace_id)
                .ok_or_else(|| ApiError::not_found(Entity::Member))?;
            if other.id == me.id {
                return Err(DomainRule::SelfConversation.into());
            }
            Ok(db.get_or_create_conversation(Uuid::new_v4(), workspace_id, me.id, other.id)?)
        })
        .await?;
    Ok(Json(conversation))
}

/// GET /conversations/{id}: participants only.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .blocking(move |db| {
            let conversation = db
                .get_conversation(conversation_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Conversation))?;
            let me = require_member(db.get_member_by_user(conversation.workspace_id, claims.sub)?)?;
            if !conversation.involves(me.id) {
                return Err(ChatError::Unauthorized.into());
            }
            Ok(conversation)
        })
        .await?;
    Ok(Json(conversation))
}
