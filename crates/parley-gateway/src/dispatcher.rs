use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use parley_types::events::FeedEvent;
use parley_types::models::FeedScope;

/// Capacity of the event ring; receivers that fall further behind skip events.
const EVENT_BUFFER: usize = 1024;

/// Fans committed mutations out to every live feed subscription.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for feed events; each connection filters its own
    broadcast_tx: broadcast::Sender<FeedEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to feed events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to all connected clients. Having nobody listening is fine.
    pub fn publish(&self, event: FeedEvent) {
        debug!(scope = ?event.scope(), "publishing feed event");
        let _ = self.inner.broadcast_tx.send(event);
    }
}

/// What one connection wants to hear about. Each scope remembers the
/// workspace it belongs to so leaving a workspace drops its feeds too.
#[derive(Debug, Default, Clone)]
pub struct Subscriptions {
    scopes: HashMap<FeedScope, Uuid>,
    workspaces: HashSet<Uuid>,
}

impl Subscriptions {
    pub fn new(workspaces: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            scopes: HashMap::new(),
            workspaces: workspaces.into_iter().collect(),
        }
    }

    /// Replace the subscribed feeds with `(scope, workspace_id)` pairs.
    pub fn replace_scopes(&mut self, scopes: impl IntoIterator<Item = (FeedScope, Uuid)>) {
        self.scopes = scopes.into_iter().collect();
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Forget a workspace and every feed inside it.
    pub fn leave(&mut self, workspace_id: Uuid) {
        self.workspaces.remove(&workspace_id);
        self.scopes.retain(|_, owner| *owner != workspace_id);
    }

    /// Scoped events go to subscribers of that scope, workspace events to
    /// members of that workspace.
    pub fn wants(&self, event: &FeedEvent) -> bool {
        if let Some(scope) = event.scope() {
            return self.scopes.contains_key(&scope);
        }
        match event.workspace_id() {
            Some(workspace_id) => self.workspaces.contains(&workspace_id),
            None => false,
        }
    }

    /// Apply an event that changes this connection's own access. Returns
    /// the workspace left, if any.
    pub fn observe(&mut self, user_id: Uuid, event: &FeedEvent) -> Option<Uuid> {
        match event {
            FeedEvent::MemberRemoved {
                workspace_id,
                user_id: removed,
                ..
            } if *removed == user_id => {
                self.leave(*workspace_id);
                Some(*workspace_id)
            }
            _ => None,
        }
    }
}
