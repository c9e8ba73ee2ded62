use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FeedScope, Message, Role};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the external identity provider
/// and verified by both the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub exp: usize,
}

// -- Workspaces --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinWorkspaceRequest {
    pub join_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameWorkspaceRequest {
    pub name: String,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelNameRequest {
    pub name: String,
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConversationRequest {
    pub member_id: Uuid,
}

// -- Members --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemberRequest {
    pub role: Role,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub body: String,
    #[serde(default)]
    pub image: Option<Uuid>,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub parent_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub body: String,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query string of `GET /messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<Uuid>,
    #[serde(default = "default_page_size")]
    pub num_items: u32,
    /// Opaque continuation cursor from the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl ListMessagesQuery {
    pub fn for_scope(scope: &FeedScope, num_items: u32, cursor: Option<String>) -> Self {
        let mut query = Self {
            num_items,
            cursor,
            ..Self::default()
        };
        match *scope {
            FeedScope::Channel(id) => query.channel_id = Some(id),
            FeedScope::Conversation(id) => query.conversation_id = Some(id),
            FeedScope::Thread(id) => query.parent_message_id = Some(id),
        }
        query
    }
}

/// One page of a feed, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub page: Vec<Message>,
    pub continue_cursor: Option<String>,
    pub is_done: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: Uuid,
}

// -- Reactions --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub value: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub added: bool,
}

// -- Uploads --

/// Largest accepted upload body.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// How long an upload URL stays valid, in seconds.
pub const UPLOAD_TICKET_TTL_SECS: i64 = 60 * 60;

/// Only images can be attached to messages.
pub fn is_accepted_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().to_ascii_lowercase().starts_with("image/"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UploadResponse {
    pub storage_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_page_size() {
        let q: ListMessagesQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.num_items, DEFAULT_PAGE_SIZE);
        assert!(q.cursor.is_none());
    }

    #[test]
    fn only_images_are_accepted() {
        assert!(is_accepted_content_type("image/png"));
        assert!(is_accepted_content_type("IMAGE/JPEG; charset=binary"));
        assert!(!is_accepted_content_type("application/pdf"));
        assert!(!is_accepted_content_type(""));
    }

    #[test]
    fn list_query_for_thread_sets_parent_only() {
        let parent = Uuid::new_v4();
        let q = ListMessagesQuery::for_scope(&FeedScope::Thread(parent), 5, None);
        assert_eq!(q.parent_message_id, Some(parent));
        assert!(q.channel_id.is_none());
        assert!(q.conversation_id.is_none());
        assert_eq!(q.num_items, 5);
    }
}
