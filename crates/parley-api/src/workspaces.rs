use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use parley_types::access::{require_admin, require_member};
use parley_types::api::{Claims, CreateWorkspaceRequest, JoinWorkspaceRequest, RenameWorkspaceRequest};
use parley_types::models::Workspace;
use parley_types::{DomainRule, Entity};

use crate::error::ApiError;
use crate::state::AppState;

const JOIN_CODE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..Workspace::JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

/// POST /workspaces: the creator becomes admin and a `general` channel is created.
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = Workspace {
        id: Uuid::new_v4(),
        name: Workspace::normalize_name(&req.name)?,
        user_id: claims.sub,
        join_code: generate_join_code(),
        created_at: Utc::now(),
    };

    let created = workspace.clone();
    state
        .blocking(move |db| Ok(db.create_workspace(&created, Uuid::new_v4(), Uuid::new_v4())?))
        .await?;

    info!("{} created workspace {}", claims.sub, workspace.id);
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// GET /workspaces: workspaces the caller belongs to.
pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workspaces = state
        .blocking(move |db| Ok(db.list_workspaces_for_user(claims.sub)?))
        .await?;
    Ok(Json(workspaces))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state
        .blocking(move |db| {
            require_member(db.get_member_by_user(workspace_id, claims.sub)?)?;
            db.get_workspace(workspace_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Workspace))
        })
        .await?;
    Ok(Json(workspace))
}

/// PATCH /workspaces/{id} (admin)
pub async fn rename_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RenameWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = Workspace::normalize_name(&req.name)?;
    let workspace = state
        .blocking(move |db| {
            require_admin(db.get_member_by_user(workspace_id, claims.sub)?)?;
            db.rename_workspace(workspace_id, &name)?;
            db.get_workspace(workspace_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Workspace))
        })
        .await?;
    Ok(Json(workspace))
}

/// POST /workspaces/{id}/join-code (admin): rotate the join code.
pub async fn regenerate_join_code(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let join_code = generate_join_code();
    let workspace = state
        .blocking(move |db| {
            require_admin(db.get_member_by_user(workspace_id, claims.sub)?)?;
            db.update_join_code(workspace_id, &join_code)?;
            db.get_workspace(workspace_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Workspace))
        })
        .await?;
    info!("{} rotated join code of {}", claims.sub, workspace_id);
    Ok(Json(workspace))
}

/// POST /workspaces/{id}/join: idempotent for existing members.
pub async fn join_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .blocking(move |db| {
            let workspace = db
                .get_workspace(workspace_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Workspace))?;
            if !workspace.accepts_join_code(&req.join_code) {
                return Err(DomainRule::InvalidJoinCode.into());
            }
            Ok(db.join_workspace(Uuid::new_v4(), workspace_id, claims.sub)?)
        })
        .await?;
    Ok(Json(member))
}
