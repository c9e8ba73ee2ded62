use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatError, DomainRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub user_id: Uuid,
    pub join_code: String,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub const MAX_NAME_LEN: usize = 80;
    pub const JOIN_CODE_LEN: usize = 6;

    pub fn normalize_name(raw: &str) -> Result<String, ChatError> {
        let name = raw.trim();
        if name.is_empty() || name.chars().count() > Self::MAX_NAME_LEN {
            return Err(DomainRule::InvalidName(raw.to_string()).into());
        }
        Ok(name.to_string())
    }

    /// Join codes are compared case-insensitively.
    pub fn accepts_join_code(&self, code: &str) -> bool {
        self.join_code.eq_ignore_ascii_case(code.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub const MAX_NAME_LEN: usize = 80;

    /// Channel names are lowercase with spaces replaced by dashes.
    pub fn normalize_name(raw: &str) -> Result<String, ChatError> {
        let name = raw.trim().replace(char::is_whitespace, "-").to_lowercase();
        if name.is_empty() || name.chars().count() > Self::MAX_NAME_LEN {
            return Err(DomainRule::InvalidName(raw.to_string()).into());
        }
        Ok(name)
    }
}

/// A 1:1 direct-message conversation between two members of a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub member_one_id: Uuid,
    pub member_two_id: Uuid,
}

impl Conversation {
    pub fn involves(&self, member_id: Uuid) -> bool {
        self.member_one_id == member_id || self.member_two_id == member_id
    }
}

/// Membership of a user in a workspace. Unique per (workspace, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

impl Member {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberWithUser {
    #[serde(flatten)]
    pub member: Member,
    pub user: User,
}

/// Filter context of a message feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum FeedScope {
    Channel(Uuid),
    Conversation(Uuid),
    /// Replies to the given parent message.
    Thread(Uuid),
}

impl FeedScope {
    /// Build a scope from the optional query parameters of a feed request.
    /// A parent message always selects the thread; channel and conversation
    /// are then only context.
    pub fn from_parts(
        channel_id: Option<Uuid>,
        conversation_id: Option<Uuid>,
        parent_message_id: Option<Uuid>,
    ) -> Result<Self, ChatError> {
        match (channel_id, conversation_id, parent_message_id) {
            (_, _, Some(parent)) => Ok(Self::Thread(parent)),
            (Some(_), Some(_), None) => Err(DomainRule::AmbiguousScope.into()),
            (Some(channel), None, None) => Ok(Self::Channel(channel)),
            (None, Some(conversation), None) => Ok(Self::Conversation(conversation)),
            (None, None, None) => Err(DomainRule::MissingScope.into()),
        }
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel:{}", id),
            Self::Conversation(id) => write!(f, "conversation:{}", id),
            Self::Thread(id) => write!(f, "thread:{}", id),
        }
    }
}

/// Author profile joined into an enriched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub value: String,
    pub count: usize,
    pub member_ids: Vec<Uuid>,
}

/// Fold (value, member) pairs into per-value summaries, in order of first
/// appearance. A member is counted at most once per value.
pub fn aggregate_reactions<I>(rows: I) -> Vec<ReactionSummary>
where
    I: IntoIterator<Item = (String, Uuid)>,
{
    let mut summaries: Vec<ReactionSummary> = Vec::new();
    for (value, member_id) in rows {
        match summaries.iter_mut().find(|s| s.value == value) {
            Some(summary) => {
                if !summary.member_ids.contains(&member_id) {
                    summary.member_ids.push(member_id);
                    summary.count += 1;
                }
            }
            None => summaries.push(ReactionSummary {
                value,
                count: 1,
                member_ids: vec![member_id],
            }),
        }
    }
    summaries
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub count: u32,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub last_replier_name: Option<String>,
    pub last_replier_image: Option<String>,
}

/// A message enriched with its author, reactions and thread metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub member_id: Uuid,
    pub author: Author,
    /// Serialized rich-text document.
    pub body: String,
    pub image: Option<Uuid>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub reactions: Vec<ReactionSummary>,
    pub thread: ThreadSummary,
}

impl Message {
    /// The feed this message is listed in.
    pub fn scope(&self) -> Option<FeedScope> {
        if let Some(parent) = self.parent_message_id {
            return Some(FeedScope::Thread(parent));
        }
        match (self.channel_id, self.conversation_id) {
            (Some(channel), _) => Some(FeedScope::Channel(channel)),
            (None, Some(conversation)) => Some(FeedScope::Conversation(conversation)),
            (None, None) => None,
        }
    }
}
