use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use parley_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Verify an HS256 bearer token.
pub fn verify_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Extract and validate the JWT from the Authorization header, refresh the
/// caller's profile and hand the claims to the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(ApiError::unauthorized)?;

    let claims = verify_token(&state.jwt_secret, bearer.token()).map_err(|e| {
        warn!("rejected bearer token: {}", e);
        ApiError::unauthorized()
    })?;

    let profile = claims.clone();
    state
        .blocking(move |db| Ok(db.upsert_user(profile.sub, &profile.name, profile.image.as_deref())?))
        .await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
