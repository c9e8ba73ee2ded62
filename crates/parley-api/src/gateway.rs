use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use parley_gateway::connection;
use parley_types::ChatError;

use crate::error::ApiError;
use crate::middleware::verify_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    token: String,
}

/// GET /gateway?token=<jwt>: browsers can't set headers on a WebSocket
/// handshake, so the token travels in the query string.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match verify_token(&state.jwt_secret, &params.token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("gateway: rejected token: {}", e);
            return ApiError(ChatError::Unauthorized).into_response();
        }
    };

    let profile = claims.clone();
    if let Err(e) = state
        .blocking(move |db| Ok(db.upsert_user(profile.sub, &profile.name, profile.image.as_deref())?))
        .await
    {
        return e.into_response();
    }

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, claims.sub))
}
