use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every failure a query or mutation can surface. Serialized on the wire as
/// `{"kind": ..., "detail": ...}` so clients get the same variant back.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ChatError {
    /// Caller is not a member of the workspace or lacks the required role.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{0}")]
    DomainRule(DomainRule),

    /// Upload endpoint or other upstream transport answered with a failure.
    #[error("Upstream failure: {0}")]
    UpstreamIo(String),

    /// Storage or transport fault the caller cannot act on.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn internal(err: impl fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn upstream(err: impl fmt::Display) -> Self {
        Self::UpstreamIo(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    Workspace,
    Channel,
    Conversation,
    Member,
    Message,
    ParentMessage,
    Upload,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Workspace => "Workspace",
            Self::Channel => "Channel",
            Self::Conversation => "Conversation",
            Self::Member => "Member",
            Self::Message => "Message",
            Self::ParentMessage => "Parent message",
            Self::Upload => "Upload",
        };
        f.write_str(name)
    }
}

/// Requests that are well-formed and authorized but break a domain rule.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DomainRule {
    #[error("Admin can not be removed")]
    AdminCannotBeRemoved,

    #[error("Cannot remove self as admin")]
    CannotRemoveSelfAsAdmin,

    #[error("A message belongs to either a channel or a conversation, not both")]
    AmbiguousScope,

    #[error("A channel, conversation or parent message is required")]
    MissingScope,

    #[error("Body is empty")]
    EmptyBody,

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid reaction: {0}")]
    InvalidReaction(String),

    #[error("Invalid pagination cursor")]
    InvalidCursor,

    #[error("Invalid join code")]
    InvalidJoinCode,

    #[error("Cannot start a conversation with yourself")]
    SelfConversation,

    #[error("Upload ticket expired or already used")]
    UploadTicketSpent,

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Upload exceeds {0} bytes")]
    UploadTooLarge(usize),

    #[error("File is still attached to a message")]
    UploadInUse,
}

impl From<DomainRule> for ChatError {
    fn from(rule: DomainRule) -> Self {
        Self::DomainRule(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_user_facing_text() {
        assert_eq!(ChatError::NotFound(Entity::ParentMessage).to_string(), "Parent message not found");
        assert_eq!(
            ChatError::from(DomainRule::AdminCannotBeRemoved).to_string(),
            "Admin can not be removed"
        );
        assert_eq!(ChatError::Unauthorized.to_string(), "Unauthorized");
    }

    #[test]
    fn wire_form_keeps_variant() {
        let err = ChatError::NotFound(Entity::Member);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "NotFound", "detail": "Member" }));

        let back: ChatError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);

        let unit: ChatError = serde_json::from_str(r#"{"kind":"Unauthorized"}"#).unwrap();
        assert_eq!(unit, ChatError::Unauthorized);
    }
}
