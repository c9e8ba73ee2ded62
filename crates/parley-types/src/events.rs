use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FeedScope, Message, ReactionSummary, ThreadSummary};

/// Invalidation events pushed over the gateway after a mutation commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Server confirms the WebSocket session
    Ready { user_id: Uuid },

    /// A message was posted to `scope`
    MessageCreated { scope: FeedScope, message: Message },

    /// Body of an existing message changed
    MessageUpdated { scope: FeedScope, message: Message },

    MessageDeleted { scope: FeedScope, message_id: Uuid },

    /// Full reaction aggregate of a message after a toggle
    ReactionsChanged {
        scope: FeedScope,
        message_id: Uuid,
        reactions: Vec<ReactionSummary>,
    },

    /// Thread metadata of a parent message changed (reply added or removed)
    ThreadUpdated {
        scope: FeedScope,
        parent_id: Uuid,
        thread: ThreadSummary,
    },

    /// A member left or was removed; their messages, reactions and 1:1
    /// conversations are gone
    MemberRemoved {
        workspace_id: Uuid,
        member_id: Uuid,
        user_id: Uuid,
        conversation_ids: Vec<Uuid>,
    },

    /// Channel deleted along with its messages
    ChannelDeleted { workspace_id: Uuid, channel_id: Uuid },
}

impl FeedEvent {
    /// Returns the feed scope if this event concerns a single feed.
    /// Events that return `None` are workspace-wide (see `workspace_id`).
    pub fn scope(&self) -> Option<FeedScope> {
        match self {
            Self::MessageCreated { scope, .. }
            | Self::MessageUpdated { scope, .. }
            | Self::MessageDeleted { scope, .. }
            | Self::ReactionsChanged { scope, .. }
            | Self::ThreadUpdated { scope, .. } => Some(*scope),
            Self::Ready { .. } | Self::MemberRemoved { .. } | Self::ChannelDeleted { .. } => None,
        }
    }

    pub fn workspace_id(&self) -> Option<Uuid> {
        match self {
            Self::MemberRemoved { workspace_id, .. } | Self::ChannelDeleted { workspace_id, .. } => {
                Some(*workspace_id)
            }
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Replace the set of feeds this connection receives events for.
    Subscribe { scopes: Vec<FeedScope> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_events_have_no_scope() {
        let event = FeedEvent::MemberRemoved {
            workspace_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            conversation_ids: vec![],
        };
        assert!(event.scope().is_none());
        assert!(event.workspace_id().is_some());
    }

    #[test]
    fn subscribe_command_wire_form() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"Subscribe","data":{{"scopes":[{{"kind":"channel","id":"{}"}}]}}}}"#,
            id
        );
        let GatewayCommand::Subscribe { scopes } = serde_json::from_str(&raw).unwrap();
        assert_eq!(scopes, vec![FeedScope::Channel(id)]);
    }
}
