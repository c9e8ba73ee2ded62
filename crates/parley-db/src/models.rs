/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.
use parley_types::models::Conversation;
use uuid::Uuid;

pub struct MessageRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub member_id: Uuid,
    pub author_user_id: Uuid,
    pub author_name: String,
    pub author_image: Option<String>,
    pub body: String,
    pub image: Option<Uuid>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

pub struct NewMessage<'a> {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub member_id: Uuid,
    pub body: &'a str,
    pub image: Option<Uuid>,
    pub created_at: i64,
}

pub struct ReactionRow {
    pub message_id: Uuid,
    pub member_id: Uuid,
    pub value: String,
}

/// One thread reply, reduced to what the parent's thread summary needs.
pub struct ReplyRow {
    pub parent_message_id: Uuid,
    pub created_at: i64,
    pub author_name: String,
    pub author_image: Option<String>,
}

pub struct FileRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
    pub created_at: i64,
}

/// What a member removal took with it.
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub messages_deleted: usize,
    pub reactions_deleted: usize,
    pub conversation_ids: Vec<Uuid>,
    /// Surviving parents whose thread lost replies.
    pub affected_parents: Vec<Uuid>,
}

/// Where a feed lives: its workspace, and the conversation when the feed is a
/// private 1:1 conversation or a thread inside one.
pub struct ScopeOwner {
    pub workspace_id: Uuid,
    pub conversation: Option<Conversation>,
}
