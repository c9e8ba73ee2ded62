use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use parley_db::models::{MessageRow, NewMessage, ReplyRow};
use parley_db::queries::ms_to_datetime;
use parley_db::{Cursor, Database};
use parley_types::access::{authorize_admin_delete, authorize_author, require_member};
use parley_types::api::{
    Claims, CreateMessageRequest, IdResponse, ListMessagesQuery, MAX_PAGE_SIZE, MessagePage, UpdateMessageRequest,
};
use parley_types::events::FeedEvent;
use parley_types::models::{Author, FeedScope, Member, Message, ThreadSummary, aggregate_reactions};
use parley_types::{ChatError, DomainRule, Entity};

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, now_ms};

// -- Enrichment --

/// Join reactions, thread metadata and image URLs onto stored rows. Batch
/// queries, so the cost does not grow with one query per message.
pub(crate) fn enrich(db: &Database, state: &AppStateInner, rows: Vec<MessageRow>) -> Result<Vec<Message>, ApiError> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let reaction_rows = db.get_reactions_for_messages(&ids)?;
    let mut threads = thread_summaries(db.get_replies_for_messages(&ids)?);

    let mut reactions: HashMap<Uuid, Vec<(String, Uuid)>> = HashMap::new();
    for r in reaction_rows {
        reactions.entry(r.message_id).or_default().push((r.value, r.member_id));
    }

    Ok(rows
        .into_iter()
        .map(|row| Message {
            id: row.id,
            workspace_id: row.workspace_id,
            channel_id: row.channel_id,
            conversation_id: row.conversation_id,
            parent_message_id: row.parent_message_id,
            member_id: row.member_id,
            author: Author {
                user_id: row.author_user_id,
                name: row.author_name,
                image: row.author_image,
            },
            body: row.body,
            image: row.image,
            image_url: row.image.map(|id| state.image_url(id)),
            created_at: ms_to_datetime(row.created_at),
            updated_at: row.updated_at.map(ms_to_datetime),
            reactions: aggregate_reactions(reactions.remove(&row.id).unwrap_or_default()),
            thread: threads.remove(&row.id).unwrap_or_default(),
        })
        .collect())
}

/// Replies arrive oldest first, so the last one folded in is the latest.
fn thread_summaries(replies: Vec<ReplyRow>) -> HashMap<Uuid, ThreadSummary> {
    let mut threads: HashMap<Uuid, ThreadSummary> = HashMap::new();
    for reply in replies {
        let thread = threads.entry(reply.parent_message_id).or_default();
        thread.count += 1;
        thread.last_reply_at = Some(ms_to_datetime(reply.created_at));
        thread.last_replier_name = Some(reply.author_name);
        thread.last_replier_image = reply.author_image;
    }
    threads
}

fn load_message(db: &Database, state: &AppStateInner, id: Uuid) -> Result<Message, ApiError> {
    let row = db.get_message(id)?.ok_or_else(|| ApiError::not_found(Entity::Message))?;
    enrich(db, state, vec![row])?
        .pop()
        .ok_or_else(|| ApiError::not_found(Entity::Message))
}

pub(crate) fn scope_of(row: &MessageRow) -> Result<FeedScope, ApiError> {
    Ok(FeedScope::from_parts(row.channel_id, row.conversation_id, row.parent_message_id)?)
}

/// Fresh thread metadata for a parent, addressed to the feed the parent is
/// listed in. `None` once the parent itself is gone.
pub(crate) fn thread_event(db: &Database, parent_id: Uuid) -> Result<Option<FeedEvent>, ApiError> {
    let Some(parent) = db.get_message(parent_id)? else {
        return Ok(None);
    };
    let thread = thread_summaries(db.get_replies_for_messages(&[parent_id])?)
        .remove(&parent_id)
        .unwrap_or_default();
    Ok(Some(FeedEvent::ThreadUpdated {
        scope: scope_of(&parent)?,
        parent_id,
        thread,
    }))
}

/// The caller may read a feed if they belong to its workspace and, for
/// conversations and threads inside them, take part in the conversation.
pub(crate) fn authorize_view(db: &Database, user_id: Uuid, scope: &FeedScope) -> Result<Member, ApiError> {
    let missing = match scope {
        FeedScope::Channel(_) => Entity::Channel,
        FeedScope::Conversation(_) => Entity::Conversation,
        FeedScope::Thread(_) => Entity::ParentMessage,
    };
    let owner = db.resolve_scope(scope)?.ok_or_else(|| ApiError::not_found(missing))?;
    let member = require_member(db.get_member_by_user(owner.workspace_id, user_id)?)?;
    match owner.conversation {
        Some(conversation) if !conversation.involves(member.id) => Err(ChatError::Unauthorized.into()),
        _ => Ok(member),
    }
}

fn require_body(body: &str) -> Result<(), ApiError> {
    if body.trim().is_empty() {
        return Err(DomainRule::EmptyBody.into());
    }
    Ok(())
}

// -- Handlers --

/// POST /messages
///
/// A reply without an explicit channel or conversation lands in its parent's
/// feed. A reply that names a feed must name the parent's feed.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_body(&req.body)?;

    let id = Uuid::new_v4();
    let app = state.clone();
    let (message, thread) = state
        .blocking(move |db| {
            let member = require_member(db.get_member_by_user(req.workspace_id, claims.sub)?)?;

            let parent = match req.parent_message_id {
                Some(parent_id) => Some(
                    db.get_message(parent_id)?
                        .filter(|p| p.workspace_id == req.workspace_id)
                        .ok_or_else(|| ApiError::not_found(Entity::ParentMessage))?,
                ),
                None => None,
            };

            let (channel_id, conversation_id) = match (req.channel_id, req.conversation_id, &parent) {
                (Some(_), Some(_), _) => return Err(DomainRule::AmbiguousScope.into()),
                (None, None, Some(parent)) => (parent.channel_id, parent.conversation_id),
                (None, None, None) => return Err(DomainRule::MissingScope.into()),
                (channel_id, conversation_id, parent) => {
                    let other_feed = parent
                        .as_ref()
                        .is_some_and(|p| p.channel_id != channel_id || p.conversation_id != conversation_id);
                    if other_feed {
                        return Err(ApiError::not_found(Entity::ParentMessage));
                    }
                    (channel_id, conversation_id)
                }
            };

            if let Some(channel_id) = channel_id {
                db.get_channel(channel_id)?
                    .filter(|c| c.workspace_id == req.workspace_id)
                    .ok_or_else(|| ApiError::not_found(Entity::Channel))?;
            }
            if let Some(conversation_id) = conversation_id {
                let conversation = db
                    .get_conversation(conversation_id)?
                    .filter(|c| c.workspace_id == req.workspace_id)
                    .ok_or_else(|| ApiError::not_found(Entity::Conversation))?;
                if !conversation.involves(member.id) {
                    return Err(ChatError::Unauthorized.into());
                }
            }

            if let Some(image) = req.image {
                let file = db.get_file(image)?.ok_or_else(|| ApiError::not_found(Entity::Upload))?;
                if file.user_id != claims.sub {
                    return Err(ChatError::Unauthorized.into());
                }
            }

            db.insert_message(&NewMessage {
                id,
                workspace_id: req.workspace_id,
                channel_id,
                conversation_id,
                parent_message_id: req.parent_message_id,
                member_id: member.id,
                body: &req.body,
                image: req.image,
                created_at: now_ms(),
            })?;

            let message = load_message(db, &app, id)?;
            let thread = match req.parent_message_id {
                Some(parent_id) => thread_event(db, parent_id)?,
                None => None,
            };
            Ok((message, thread))
        })
        .await?;

    if let Some(scope) = message.scope() {
        debug!("{} posted {} to {}", message.member_id, id, scope);
        state.dispatcher.publish(FeedEvent::MessageCreated { scope, message });
    }
    if let Some(event) = thread {
        state.dispatcher.publish(event);
    }

    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

/// GET /messages?channel_id|conversation_id|parent_message_id&num_items&cursor
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListMessagesQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = FeedScope::from_parts(query.channel_id, query.conversation_id, query.parent_message_id)?;
    let cursor = query
        .cursor
        .as_deref()
        .map(|raw| Cursor::decode(raw).ok_or(DomainRule::InvalidCursor))
        .transpose()?;
    let limit = query.num_items.clamp(1, MAX_PAGE_SIZE);

    let app = state.clone();
    let page = state
        .blocking(move |db| {
            authorize_view(db, claims.sub, &scope)?;

            // One extra row tells whether an older page exists.
            let mut rows = db.list_messages(&scope, cursor.as_ref(), limit + 1)?;
            let is_done = rows.len() <= limit as usize;
            rows.truncate(limit as usize);

            let continue_cursor = if is_done {
                None
            } else {
                rows.last().map(|r| {
                    Cursor {
                        created_at: r.created_at,
                        id: r.id,
                    }
                    .encode()
                })
            };

            Ok(MessagePage {
                page: enrich(db, &app, rows)?,
                continue_cursor,
                is_done,
            })
        })
        .await?;

    Ok(Json(page))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.clone();
    let message = state
        .blocking(move |db| {
            let row = db
                .get_message(message_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Message))?;
            authorize_view(db, claims.sub, &scope_of(&row)?)?;
            enrich(db, &app, vec![row])?
                .pop()
                .ok_or_else(|| ApiError::not_found(Entity::Message))
        })
        .await?;
    Ok(Json(message))
}

/// PATCH /messages/{id} (author)
pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_body(&req.body)?;

    let app = state.clone();
    let message = state
        .blocking(move |db| {
            let row = db
                .get_message(message_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Message))?;
            let actor = db.get_member_by_user(row.workspace_id, claims.sub)?;
            authorize_author(actor.as_ref(), row.member_id)?;
            db.update_message_body(message_id, &req.body, now_ms())?;
            load_message(db, &app, message_id)
        })
        .await?;

    if let Some(scope) = message.scope() {
        state.dispatcher.publish(FeedEvent::MessageUpdated { scope, message });
    }
    Ok(Json(IdResponse { id: message_id }))
}

/// DELETE /messages/{id} (author)
pub async fn remove_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    delete_message(&state, claims, message_id, false).await?;
    Ok(Json(IdResponse { id: message_id }))
}

/// DELETE /messages/{id}/admin (workspace admin)
pub async fn admin_remove_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = claims.sub;
    delete_message(&state, claims, message_id, true).await?;
    info!("admin {} deleted message {}", admin, message_id);
    Ok(Json(IdResponse { id: message_id }))
}

async fn delete_message(state: &AppState, claims: Claims, message_id: Uuid, as_admin: bool) -> Result<(), ApiError> {
    let (scope, thread) = state
        .blocking(move |db| {
            let row = db
                .get_message(message_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Message))?;
            let actor = db.get_member_by_user(row.workspace_id, claims.sub)?;
            if as_admin {
                authorize_admin_delete(actor.as_ref(), row.workspace_id)?;
            } else {
                authorize_author(actor.as_ref(), row.member_id)?;
            }

            let scope = scope_of(&row)?;
            db.delete_message(message_id)?;
            let thread = match row.parent_message_id {
                Some(parent_id) => thread_event(db, parent_id)?,
                None => None,
            };
            Ok((scope, thread))
        })
        .await?;

    state.dispatcher.publish(FeedEvent::MessageDeleted { scope, message_id });
    if let Some(event) = thread {
        state.dispatcher.publish(event);
    }
    Ok(())
}
