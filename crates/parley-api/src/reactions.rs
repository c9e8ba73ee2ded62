use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};
use parley_types::events::FeedEvent;
use parley_types::models::aggregate_reactions;
use parley_types::{DomainRule, Entity};

use crate::error::ApiError;
use crate::messages::{authorize_view, scope_of};
use crate::state::AppState;

/// Longest accepted reaction value, in characters. Emoji sequences with
/// modifiers run to several code points.
const MAX_REACTION_LEN: usize = 32;

fn validate_reaction(value: &str) -> Result<&str, ApiError> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > MAX_REACTION_LEN {
        return Err(DomainRule::InvalidReaction(value.to_string()).into());
    }
    Ok(value)
}

/// POST /messages/{id}/reactions: add the caller's reaction, or take it back
/// if it is already there. Pushes the message's full aggregate to its feed.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let value = validate_reaction(&req.value)?.to_string();

    let (added, event) = state
        .blocking(move |db| {
            let row = db
                .get_message(message_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Message))?;
            let scope = scope_of(&row)?;
            let member = authorize_view(db, claims.sub, &scope)?;

            let added = db.toggle_reaction(Uuid::new_v4(), row.workspace_id, message_id, member.id, &value)?;

            let reactions = aggregate_reactions(
                db.get_reactions_for_messages(&[message_id])?
                    .into_iter()
                    .map(|r| (r.value, r.member_id)),
            );
            Ok((
                added,
                FeedEvent::ReactionsChanged {
                    scope,
                    message_id,
                    reactions,
                },
            ))
        })
        .await?;

    state.dispatcher.publish(event);
    Ok(Json(ToggleReactionResponse { added }))
}
