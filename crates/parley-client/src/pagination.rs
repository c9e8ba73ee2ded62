use std::future::Future;

use tracing::debug;

use parley_types::ChatError;
use parley_types::api::{DEFAULT_PAGE_SIZE, MessagePage};
use parley_types::events::FeedEvent;
use parley_types::models::{FeedScope, Message, ReactionSummary};
use uuid::Uuid;

/// Anything that can serve pages of a feed, newest first.
pub trait FeedSource: Send + Sync {
    fn fetch_page(
        &self,
        scope: FeedScope,
        num_items: u32,
        cursor: Option<String>,
    ) -> impl Future<Output = Result<MessagePage, ChatError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    LoadingFirstPage,
    CanLoadMore,
    LoadingMore,
    Exhausted,
}

/// A feed paged backward in time, kept current by live events.
///
/// Messages are held newest first. Loading more only ever appends older
/// messages, never reorders or duplicates ones already held.
pub struct PaginatedFeed<S> {
    source: S,
    scope: FeedScope,
    page_size: u32,
    messages: Vec<Message>,
    cursor: Option<String>,
    status: PageStatus,
}

impl<S: FeedSource> PaginatedFeed<S> {
    pub fn new(source: S, scope: FeedScope) -> Self {
        Self::with_page_size(source, scope, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(source: S, scope: FeedScope, page_size: u32) -> Self {
        Self {
            source,
            scope,
            page_size,
            messages: Vec::new(),
            cursor: None,
            status: PageStatus::LoadingFirstPage,
        }
    }

    pub fn scope(&self) -> FeedScope {
        self.scope
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// (Re)load the newest page, dropping whatever was held. On failure the
    /// held messages and status are kept.
    pub async fn load_first(&mut self) -> Result<(), ChatError> {
        let previous = self.status;
        self.status = PageStatus::LoadingFirstPage;
        match self.source.fetch_page(self.scope, self.page_size, None).await {
            Ok(page) => {
                self.messages.clear();
                self.absorb(page);
                Ok(())
            }
            Err(e) => {
                self.status = previous;
                Err(e)
            }
        }
    }

    /// Fetch the next older page. A no-op unless the status is `CanLoadMore`.
    pub async fn load_more(&mut self) -> Result<(), ChatError> {
        if self.status != PageStatus::CanLoadMore {
            return Ok(());
        }

        self.status = PageStatus::LoadingMore;
        match self
            .source
            .fetch_page(self.scope, self.page_size, self.cursor.clone())
            .await
        {
            Ok(page) => {
                self.absorb(page);
                Ok(())
            }
            Err(e) => {
                self.status = PageStatus::CanLoadMore;
                Err(e)
            }
        }
    }

    fn absorb(&mut self, page: MessagePage) {
        let before = self.messages.len();
        for message in page.page {
            if !self.messages.iter().any(|m| m.id == message.id) {
                self.messages.push(message);
            }
        }
        debug!("{}: {} older messages", self.scope, self.messages.len() - before);

        self.cursor = page.continue_cursor;
        self.status = if page.is_done || self.cursor.is_none() {
            PageStatus::Exhausted
        } else {
            PageStatus::CanLoadMore
        };
    }

    /// Fold a live event into the feed. Returns whether anything changed.
    pub fn apply(&mut self, event: &FeedEvent) -> bool {
        match event {
            FeedEvent::MemberRemoved {
                member_id,
                conversation_ids,
                ..
            } => {
                let conversation_gone = match self.scope {
                    FeedScope::Conversation(id) => conversation_ids.contains(&id),
                    _ => false,
                };
                if conversation_gone {
                    return self.close();
                }
                let before = self.messages.len();
                self.messages.retain(|m| m.member_id != *member_id);
                let mut changed = self.messages.len() != before;
                for message in &mut self.messages {
                    changed |= drop_reactions_of(&mut message.reactions, *member_id);
                }
                return changed;
            }
            FeedEvent::ChannelDeleted { channel_id, .. } => {
                if self.scope == FeedScope::Channel(*channel_id) {
                    return self.close();
                }
                return false;
            }
            _ => {}
        }

        if event.scope() != Some(self.scope) {
            return false;
        }

        match event {
            FeedEvent::MessageCreated { message, .. } => {
                if self.messages.iter().any(|m| m.id == message.id) {
                    return false;
                }
                self.messages.insert(0, message.clone());
                true
            }
            FeedEvent::MessageUpdated { message, .. } => self.update(message.id, |m| *m = message.clone()),
            FeedEvent::MessageDeleted { message_id, .. } => {
                let before = self.messages.len();
                self.messages.retain(|m| m.id != *message_id);
                self.messages.len() != before
            }
            FeedEvent::ReactionsChanged {
                message_id, reactions, ..
            } => self.update(*message_id, |m| m.reactions = reactions.clone()),
            FeedEvent::ThreadUpdated { parent_id, thread, .. } => {
                self.update(*parent_id, |m| m.thread = thread.clone())
            }
            _ => false,
        }
    }

    fn update(&mut self, id: Uuid, f: impl FnOnce(&mut Message)) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }

    /// The feed itself is gone.
    fn close(&mut self) -> bool {
        self.messages.clear();
        self.cursor = None;
        self.status = PageStatus::Exhausted;
        true
    }
}

/// Remove `member_id` from every summary, dropping summaries left empty.
fn drop_reactions_of(reactions: &mut Vec<ReactionSummary>, member_id: Uuid) -> bool {
    let mut changed = false;
    for summary in reactions.iter_mut() {
        let before = summary.member_ids.len();
        summary.member_ids.retain(|id| *id != member_id);
        if summary.member_ids.len() != before {
            summary.count = summary.member_ids.len();
            changed = true;
        }
    }
    reactions.retain(|summary| summary.count > 0);
    changed
}
