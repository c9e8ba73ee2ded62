use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::Entity;
use parley_types::access::{authorize_member_removal, authorize_member_update, require_member};
use parley_types::api::{Claims, IdResponse, UpdateMemberRequest};
use parley_types::events::FeedEvent;

use crate::error::ApiError;
use crate::messages::thread_event;
use crate::state::AppState;

/// GET /workspaces/{id}/members/current: the caller's membership, or `null`.
pub async fn current_member(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .blocking(move |db| Ok(db.get_member_by_user(workspace_id, claims.sub)?))
        .await?;
    Ok(Json(member))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state
        .blocking(move |db| {
            require_member(db.get_member_by_user(workspace_id, claims.sub)?)?;
            Ok(db.list_members(workspace_id)?)
        })
        .await?;
    Ok(Json(members))
}

/// GET /members/{id}: a member with their profile, for fellow members.
pub async fn get_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .blocking(move |db| {
            let target = db
                .get_member(member_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Member))?;
            require_member(db.get_member_by_user(target.workspace_id, claims.sub)?)?;
            db.list_members(target.workspace_id)?
                .into_iter()
                .find(|m| m.member.id == member_id)
                .ok_or_else(|| ApiError::not_found(Entity::Member))
        })
        .await?;
    Ok(Json(member))
}

/// PATCH /members/{id}: admins of the same workspace change roles.
pub async fn update_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .blocking(move |db| {
            let mut target = db
                .get_member(member_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Member))?;
            let actor = db.get_member_by_user(target.workspace_id, claims.sub)?;
            authorize_member_update(actor.as_ref(), &target)?;
            db.update_member_role(member_id, req.role)?;
            target.role = req.role;
            Ok(target)
        })
        .await?;

    info!("{} set role of member {} to {}", claims.sub, member_id, member.role);
    Ok(Json(member))
}

/// DELETE /members/{id}
///
/// Takes the member's messages, reactions and 1:1 conversations with them.
/// Threads that lost replies get fresh metadata pushed to their feeds.
pub async fn remove_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (target, report, threads) = state
        .blocking(move |db| {
            let target = db
                .get_member(member_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Member))?;
            let actor = db.get_member_by_user(target.workspace_id, claims.sub)?;
            if let Err(e) = authorize_member_removal(actor.as_ref(), &target) {
                warn!("{} may not remove member {}: {}", claims.sub, member_id, e);
                return Err(e.into());
            }

            let report = db.remove_member(member_id)?;
            let mut threads = Vec::with_capacity(report.affected_parents.len());
            for parent_id in &report.affected_parents {
                if let Some(event) = thread_event(db, *parent_id)? {
                    threads.push(event);
                }
            }
            Ok((target, report, threads))
        })
        .await?;

    info!(
        "member {} removed from {} ({} messages, {} reactions, {} conversations)",
        member_id,
        target.workspace_id,
        report.messages_deleted,
        report.reactions_deleted,
        report.conversation_ids.len()
    );

    state.dispatcher.publish(FeedEvent::MemberRemoved {
        workspace_id: target.workspace_id,
        member_id,
        user_id: target.user_id,
        conversation_ids: report.conversation_ids,
    });
    for event in threads {
        state.dispatcher.publish(event);
    }

    Ok(Json(IdResponse { id: member_id }))
}
