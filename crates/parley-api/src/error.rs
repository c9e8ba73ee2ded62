use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use parley_types::{ChatError, DomainRule, Entity};

/// Handler error: a `ChatError` rendered as `{"error": {...}}` with a status
/// derived from its kind.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl ApiError {
    pub fn unauthorized() -> Self {
        Self(ChatError::Unauthorized)
    }

    pub fn not_found(entity: Entity) -> Self {
        Self(ChatError::NotFound(entity))
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::DomainRule(_) => StatusCode::CONFLICT,
            ChatError::UpstreamIo(_) => StatusCode::BAD_GATEWAY,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl From<DomainRule> for ApiError {
    fn from(rule: DomainRule) -> Self {
        Self(rule.into())
    }
}

/// Storage faults. The cause is logged; the caller only learns that it failed.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("storage error: {:#}", err);
        Self(ChatError::internal("storage failure"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("spawn_blocking join error: {}", err);
        Self(ChatError::internal("task failure"))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        error!("file storage error: {}", err);
        Self(ChatError::internal("file storage failure"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.0 }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_kind() {
        assert_eq!(ApiError::unauthorized().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found(Entity::ParentMessage).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(DomainRule::AdminCannotBeRemoved).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let ApiError(err) = ApiError::from(anyhow::anyhow!("UNIQUE constraint failed: members.id"));
        assert_eq!(err, ChatError::Internal("storage failure".into()));
    }
}
