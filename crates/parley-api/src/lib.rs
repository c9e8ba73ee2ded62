pub mod channels;
pub mod conversations;
pub mod error;
pub mod gateway;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod state;
pub mod storage;
pub mod uploads;
pub mod workspaces;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use parley_types::api::MAX_UPLOAD_SIZE;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// REST routes and the `/gateway` WebSocket. The health check is mounted by
/// the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route(
            "/uploads/{token}",
            post(uploads::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/storage/{storage_id}", get(uploads::download_file))
        .route("/gateway", get(gateway::ws_upgrade));

    let protected_routes = Router::new()
        .route(
            "/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/workspaces/{workspace_id}",
            get(workspaces::get_workspace).patch(workspaces::rename_workspace),
        )
        .route("/workspaces/{workspace_id}/join", post(workspaces::join_workspace))
        .route(
            "/workspaces/{workspace_id}/join-code",
            post(workspaces::regenerate_join_code),
        )
        .route(
            "/workspaces/{workspace_id}/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route(
            "/channels/{channel_id}",
            get(channels::get_channel)
                .patch(channels::rename_channel)
                .delete(channels::delete_channel),
        )
        .route(
            "/workspaces/{workspace_id}/conversations",
            post(conversations::open_conversation),
        )
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/workspaces/{workspace_id}/members", get(members::list_members))
        .route("/workspaces/{workspace_id}/members/current", get(members::current_member))
        .route(
            "/members/{member_id}",
            get(members::get_member)
                .patch(members::update_member)
                .delete(members::remove_member),
        )
        .route(
            "/messages",
            get(messages::list_messages).post(messages::create_message),
        )
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::update_message)
                .delete(messages::remove_message),
        )
        .route("/messages/{message_id}/admin", delete(messages::admin_remove_message))
        .route("/messages/{message_id}/reactions", post(reactions::toggle_reaction))
        .route("/upload-url", post(uploads::generate_upload_url))
        .route("/files/{storage_id}", delete(uploads::discard_file))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests;
