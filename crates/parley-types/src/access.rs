//! Membership and role checks.
//!
//! Every check is a pure function of the caller's resolved membership and the
//! target, so the server enforces and the client gates with the same rules.

use uuid::Uuid;

use crate::error::{ChatError, DomainRule};
use crate::models::{Member, Message};

/// Find the caller's membership row for a workspace.
pub fn resolve_membership(members: &[Member], workspace_id: Uuid, user_id: Uuid) -> Option<&Member> {
    members
        .iter()
        .find(|m| m.workspace_id == workspace_id && m.user_id == user_id)
}

pub fn require_member(member: Option<Member>) -> Result<Member, ChatError> {
    member.ok_or(ChatError::Unauthorized)
}

/// Gates channel create/rename/delete, admin message deletion and role changes.
pub fn require_admin(member: Option<Member>) -> Result<Member, ChatError> {
    match member {
        Some(m) if m.is_admin() => Ok(m),
        _ => Err(ChatError::Unauthorized),
    }
}

pub fn authorize_member_update(actor: Option<&Member>, target: &Member) -> Result<(), ChatError> {
    match actor {
        Some(a) if a.workspace_id == target.workspace_id && a.is_admin() => Ok(()),
        _ => Err(ChatError::Unauthorized),
    }
}

/// Admins can never be removed, not even by themselves. Non-admins may leave
/// on their own; removing somebody else takes an admin.
pub fn authorize_member_removal(actor: Option<&Member>, target: &Member) -> Result<(), ChatError> {
    let actor = match actor {
        Some(a) if a.workspace_id == target.workspace_id => a,
        _ => return Err(ChatError::Unauthorized),
    };

    let is_self = actor.id == target.id;
    if is_self && actor.is_admin() {
        return Err(DomainRule::CannotRemoveSelfAsAdmin.into());
    }
    if target.is_admin() {
        return Err(DomainRule::AdminCannotBeRemoved.into());
    }
    if !is_self && !actor.is_admin() {
        return Err(ChatError::Unauthorized);
    }
    Ok(())
}

/// Only the author edits or deletes their own message.
pub fn authorize_author(actor: Option<&Member>, author_member_id: Uuid) -> Result<(), ChatError> {
    match actor {
        Some(a) if a.id == author_member_id => Ok(()),
        _ => Err(ChatError::Unauthorized),
    }
}

pub fn authorize_admin_delete(actor: Option<&Member>, workspace_id: Uuid) -> Result<(), ChatError> {
    match actor {
        Some(a) if a.workspace_id == workspace_id && a.is_admin() => Ok(()),
        _ => Err(ChatError::Unauthorized),
    }
}

/// Which message actions a viewer is offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageActions {
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_admin_delete: bool,
    pub can_react: bool,
    pub can_reply: bool,
}

impl MessageActions {
    pub fn for_viewer(viewer: Option<&Member>, message: &Message) -> Self {
        let Some(viewer) = viewer.filter(|v| v.workspace_id == message.workspace_id) else {
            return Self::default();
        };

        let is_author = viewer.id == message.member_id;
        Self {
            can_edit: is_author,
            can_delete: is_author,
            can_admin_delete: !is_author && viewer.is_admin(),
            can_react: true,
            can_reply: message.parent_message_id.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn member(workspace_id: Uuid, role: Role) -> Member {
        Member {
            id: Uuid::new_v4(),
            workspace_id,
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn resolve_picks_workspace_and_user() {
        let ws = Uuid::new_v4();
        let other_ws = Uuid::new_v4();
        let a = member(ws, Role::Member);
        let mut b = member(other_ws, Role::Admin);
        b.user_id = a.user_id;
        let members = vec![b.clone(), a.clone()];

        assert_eq!(resolve_membership(&members, ws, a.user_id), Some(&a));
        assert_eq!(resolve_membership(&members, other_ws, a.user_id), Some(&b));
        assert_eq!(resolve_membership(&members, Uuid::new_v4(), a.user_id), None);
    }

    #[test]
    fn admin_target_is_never_removable() {
        let ws = Uuid::new_v4();
        let admin = member(ws, Role::Admin);
        let other_admin = member(ws, Role::Admin);

        assert_eq!(
            authorize_member_removal(Some(&admin), &other_admin),
            Err(ChatError::DomainRule(DomainRule::AdminCannotBeRemoved))
        );
        assert_eq!(
            authorize_member_removal(Some(&admin), &admin),
            Err(ChatError::DomainRule(DomainRule::CannotRemoveSelfAsAdmin))
        );
    }

    #[test]
    fn member_may_leave_but_not_kick() {
        let ws = Uuid::new_v4();
        let a = member(ws, Role::Member);
        let b = member(ws, Role::Member);
        let admin = member(ws, Role::Admin);

        assert_eq!(authorize_member_removal(Some(&a), &a), Ok(()));
        assert_eq!(authorize_member_removal(Some(&a), &b), Err(ChatError::Unauthorized));
        assert_eq!(authorize_member_removal(Some(&admin), &b), Ok(()));
        assert_eq!(authorize_member_removal(None, &b), Err(ChatError::Unauthorized));
    }

    #[test]
    fn cross_workspace_actor_is_unauthorized() {
        let a = member(Uuid::new_v4(), Role::Admin);
        let b = member(Uuid::new_v4(), Role::Member);
        assert_eq!(authorize_member_update(Some(&a), &b), Err(ChatError::Unauthorized));
        assert_eq!(authorize_member_removal(Some(&a), &b), Err(ChatError::Unauthorized));
    }

    #[test]
    fn actions_follow_authorship_and_role() {
        use chrono::Utc;

        use crate::models::{Author, ThreadSummary};

        let ws = Uuid::new_v4();
        let author = member(ws, Role::Member);
        let admin = member(ws, Role::Admin);
        let message = Message {
            id: Uuid::new_v4(),
            workspace_id: ws,
            channel_id: Some(Uuid::new_v4()),
            conversation_id: None,
            parent_message_id: None,
            member_id: author.id,
            author: Author {
                user_id: author.user_id,
                name: "Ada".into(),
                image: None,
            },
            body: "{}".into(),
            image: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: None,
            reactions: vec![],
            thread: ThreadSummary::default(),
        };

        let own = MessageActions::for_viewer(Some(&author), &message);
        assert!(own.can_edit && own.can_delete && !own.can_admin_delete && own.can_reply);

        let moderating = MessageActions::for_viewer(Some(&admin), &message);
        assert!(!moderating.can_edit && moderating.can_admin_delete && moderating.can_react);

        let outsider = member(Uuid::new_v4(), Role::Admin);
        assert_eq!(MessageActions::for_viewer(Some(&outsider), &message), MessageActions::default());

        let reply = Message {
            parent_message_id: Some(message.id),
            ..message
        };
        assert!(!MessageActions::for_viewer(Some(&author), &reply).can_reply);
    }

    #[test]
    fn require_admin_rejects_members() {
        let ws = Uuid::new_v4();
        assert!(require_admin(Some(member(ws, Role::Member))).is_err());
        assert!(require_admin(Some(member(ws, Role::Admin))).is_ok());
        assert_eq!(require_member(None), Err(ChatError::Unauthorized));
    }
}
