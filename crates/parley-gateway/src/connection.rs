use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::{FeedEvent, GatewayCommand};
use parley_types::models::FeedScope;

use crate::dispatcher::{Dispatcher, Subscriptions};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket connection whose bearer token was already verified at
/// the HTTP upgrade.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let memberships = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || db.list_memberships(user_id)).await
    };
    let workspaces = match memberships {
        Ok(Ok(members)) => members.into_iter().map(|m| m.workspace_id),
        Ok(Err(e)) => {
            warn!("gateway: failed to load memberships for {}: {}", user_id, e);
            return;
        }
        Err(e) => {
            warn!("gateway: spawn_blocking join error: {}", e);
            return;
        }
    };
    let subscriptions = Arc::new(RwLock::new(Subscriptions::new(workspaces)));

    info!("{} connected to gateway", user_id);

    let ready = FeedEvent::Ready { user_id };
    let Ok(text) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    let mut event_rx = dispatcher.subscribe();
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward matching feed events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Feed receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // The removed user still hears their own removal, then nothing
                    // more from that workspace.
                    let wanted = {
                        let mut subscriptions = send_subscriptions.write().await;
                        let wanted = subscriptions.wants(&event);
                        if let Some(workspace_id) = subscriptions.observe(user_id, &event) {
                            info!("{} removed from {}, dropping its feeds", user_id, workspace_id);
                        }
                        wanted
                    };
                    if !wanted {
                        continue;
                    }

                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode feed event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&db, user_id, cmd, &recv_subscriptions).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Arc<RwLock<Subscriptions>>,
) {
    match cmd {
        GatewayCommand::Subscribe { scopes } => {
            let requested = scopes.len();
            let db = db.clone();
            let allowed = tokio::task::spawn_blocking(move || {
                scopes
                    .into_iter()
                    .filter_map(|scope| match can_view(&db, user_id, &scope) {
                        Ok(Some(workspace_id)) => Some((scope, workspace_id)),
                        Ok(None) => {
                            warn!("{} denied subscription to {}", user_id, scope);
                            None
                        }
                        Err(e) => {
                            warn!("{} subscription check for {} failed: {}", user_id, scope, e);
                            None
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .await;

            match allowed {
                Ok(allowed) => {
                    let mut subscriptions = subscriptions.write().await;
                    subscriptions.replace_scopes(allowed);
                    info!(
                        "{} subscribed to {} of {} requested feeds",
                        user_id,
                        subscriptions.scope_count(),
                        requested
                    );
                }
                Err(e) => warn!("gateway: spawn_blocking join error: {}", e),
            }
        }
    }
}

/// A feed is visible to members of its workspace; conversation feeds (and
/// threads inside them) only to the two participants. Returns the owning
/// workspace when visible.
fn can_view(db: &Database, user_id: Uuid, scope: &FeedScope) -> anyhow::Result<Option<Uuid>> {
    let Some(owner) = db.resolve_scope(scope)? else {
        return Ok(None);
    };
    let Some(member) = db.get_member_by_user(owner.workspace_id, user_id)? else {
        return Ok(None);
    };
    let visible = owner
        .conversation
        .is_none_or(|conversation| conversation.involves(member.id));
    Ok(visible.then_some(owner.workspace_id))
}
