use std::time::Duration;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use rand::Rng;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use parley_db::models::FileRow;
use parley_types::api::{
    Claims, IdResponse, UPLOAD_TICKET_TTL_SECS, UploadResponse, UploadUrlResponse, is_accepted_content_type,
};
use parley_types::{ChatError, DomainRule, Entity};

use crate::error::ApiError;
use crate::state::{AppState, now_ms};

fn generate_ticket_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// POST /upload-url: a single-use URL the caller can POST one file to
/// within the next hour.
pub async fn generate_upload_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let token = generate_ticket_token();
    let expires_at = now_ms() + UPLOAD_TICKET_TTL_SECS * 1000;

    let ticket = token.clone();
    state
        .blocking(move |db| Ok(db.create_upload_ticket(&ticket, claims.sub, expires_at)?))
        .await?;

    Ok(Json(UploadUrlResponse {
        url: state.upload_url(&token),
    }))
}

/// POST /uploads/{token}: raw file body. The ticket is the credential, so
/// this route sits outside the auth middleware.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !is_accepted_content_type(&content_type) {
        return Err(DomainRule::UnsupportedContentType(content_type).into());
    }
    if body.is_empty() {
        return Err(DomainRule::EmptyBody.into());
    }

    let user_id = state
        .blocking(move |db| {
            db.redeem_upload_ticket(&token, now_ms())?
                .ok_or_else(|| DomainRule::UploadTicketSpent.into())
        })
        .await?;

    let storage_id = Uuid::new_v4();
    let sha256 = state.storage.write(storage_id, &body).await?;

    let file = FileRow {
        id: storage_id,
        user_id,
        content_type,
        size: body.len() as i64,
        sha256,
        created_at: now_ms(),
    };
    if let Err(e) = state.blocking(move |db| Ok(db.insert_file(&file)?)).await {
        // Don't leave an orphaned blob behind
        if let Err(cleanup) = state.storage.delete(storage_id).await {
            warn!("failed to discard unrecorded upload {}: {}", storage_id, cleanup);
        }
        return Err(e);
    }

    info!("{} uploaded {} ({} bytes)", user_id, storage_id, body.len());
    Ok((StatusCode::CREATED, Json(UploadResponse { storage_id })))
}

/// GET /storage/{id}: streams a stored file. Storage ids are unguessable
/// and are handed out in message image URLs, so no bearer token is needed.
pub async fn download_file(
    State(state): State<AppState>,
    Path(storage_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state
        .blocking(move |db| {
            db.get_file(storage_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Upload))
        })
        .await?;

    let handle = state.storage.open(storage_id).await.map_err(|e| {
        warn!("stored file {} unreadable: {}", storage_id, e);
        ApiError::not_found(Entity::Upload)
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_LENGTH, file.size.to_string()),
            (header::ETAG, format!("\"{}\"", file.sha256)),
            (header::CACHE_CONTROL, "private, max-age=31536000, immutable".to_string()),
        ],
        Body::from_stream(ReaderStream::new(handle)),
    ))
}

/// DELETE /files/{id}: discard an upload the caller owns that no message
/// refers to. Used to roll back an upload whose message was never sent.
pub async fn discard_file(
    State(state): State<AppState>,
    Path(storage_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .blocking(move |db| {
            let file = db
                .get_file(storage_id)?
                .ok_or_else(|| ApiError::not_found(Entity::Upload))?;
            if file.user_id != claims.sub {
                return Err(ChatError::Unauthorized.into());
            }
            if db.file_in_use(storage_id)? {
                return Err(DomainRule::UploadInUse.into());
            }
            Ok(db.delete_file(storage_id)?)
        })
        .await?;

    state.storage.delete(storage_id).await?;
    Ok(Json(IdResponse { id: storage_id }))
}

/// Background task that drops spent and expired upload tickets.
pub async fn run_ticket_cleanup(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match state.blocking(|db| Ok(db.purge_upload_tickets(now_ms())?)).await {
            Ok(0) => {}
            Ok(count) => info!("Cleanup: purged {} upload tickets", count),
            Err(ApiError(e)) => warn!("Upload ticket cleanup error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_tokens_are_random_hex() {
        let a = generate_ticket_token();
        let b = generate_ticket_token();
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
