use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::Dispatcher;
use parley_types::api::Claims;
use parley_types::events::FeedEvent;

use crate::state::AppStateInner;
use crate::storage::Storage;
use crate::{AppState, router};

const SECRET: &str = "test-secret";
const PUBLIC_URL: &str = "http://parley.test";

struct Harness {
    app: Router,
    state: AppState,
    dir: PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

async fn harness() -> Harness {
    let dir = std::env::temp_dir().join(format!("parley-api-{}", Uuid::new_v4()));
    let state = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        dispatcher: Dispatcher::new(),
        storage: Storage::new(dir.clone()).await.unwrap(),
        jwt_secret: SECRET.into(),
        public_url: PUBLIC_URL.into(),
    });
    Harness {
        app: router(state.clone()),
        state,
        dir,
    }
}

struct User {
    id: Uuid,
    token: String,
}

fn user(name: &str) -> User {
    let claims = Claims {
        sub: Uuid::new_v4(),
        name: name.into(),
        image: None,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    User { id: claims.sub, token }
}

impl Harness {
    async fn call(&self, method: Method, uri: &str, as_user: Option<&User>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(u) = as_user {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", u.token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, as_user: &User) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(as_user), None).await
    }

    async fn post(&self, uri: &str, as_user: &User, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(as_user), Some(body)).await
    }

    async fn delete(&self, uri: &str, as_user: &User) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(as_user), None).await
    }

    async fn upload(&self, url: &str, content_type: &str, data: &'static [u8]) -> (StatusCode, Value) {
        let path = url.strip_prefix(PUBLIC_URL).unwrap();
        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(data))
            .unwrap();
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

/// An admin-owned workspace with one plain member.
struct Team {
    workspace_id: String,
    general: String,
    admin: User,
    admin_member: String,
    member: User,
    member_id: String,
}

async fn team(h: &Harness) -> Team {
    let admin = user("Ada");
    let member = user("Grace");

    let (status, ws) = h.post("/workspaces", &admin, json!({ "name": "Acme" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let workspace_id = ws["id"].as_str().unwrap().to_string();

    let (status, _) = h
        .post(
            &format!("/workspaces/{}/join", workspace_id),
            &member,
            json!({ "join_code": ws["join_code"].as_str().unwrap().to_uppercase() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, channels) = h.get(&format!("/workspaces/{}/channels", workspace_id), &admin).await;
    let general = channels[0]["id"].as_str().unwrap().to_string();
    assert_eq!(channels[0]["name"], "general");

    let (_, me) = h.get(&format!("/workspaces/{}/members/current", workspace_id), &admin).await;
    let admin_member = me["id"].as_str().unwrap().to_string();
    assert_eq!(me["role"], "admin");
    let (_, me) = h.get(&format!("/workspaces/{}/members/current", workspace_id), &member).await;
    let member_id = me["id"].as_str().unwrap().to_string();
    assert_eq!(me["role"], "member");

    Team {
        workspace_id,
        general,
        admin,
        admin_member,
        member,
        member_id,
    }
}

async fn post_to_channel(h: &Harness, t: &Team, who: &User, body: &str) -> String {
    let (status, created) = h
        .post(
            "/messages",
            who,
            json!({ "body": body, "workspace_id": t.workspace_id, "channel_id": t.general }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let h = harness().await;
    let (status, body) = h.call(Method::GET, "/workspaces", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "Unauthorized");

    let forged = User {
        id: Uuid::new_v4(),
        token: "not-a-jwt".into(),
    };
    let (status, _) = h.get("/workspaces", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_join_code_is_a_domain_rule() {
    let h = harness().await;
    let t = team(&h).await;
    let stranger = user("Mallory");

    let (status, body) = h
        .post(
            &format!("/workspaces/{}/join", t.workspace_id),
            &stranger,
            json!({ "join_code": "nope00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!({ "kind": "DomainRule", "detail": "InvalidJoinCode" }));
}

#[tokio::test]
async fn message_sent_to_a_channel_belongs_to_that_channel_only() {
    let h = harness().await;
    let t = team(&h).await;
    let id = post_to_channel(&h, &t, &t.member, "hello").await;

    let (status, message) = h.get(&format!("/messages/{}", id), &t.admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["channel_id"].as_str(), Some(t.general.as_str()));
    assert!(message["conversation_id"].is_null());
    assert!(message["parent_message_id"].is_null());
    assert_eq!(message["author"]["name"], "Grace");
    assert_eq!(message["member_id"].as_str(), Some(t.member_id.as_str()));
}

#[tokio::test]
async fn reply_without_scope_lands_in_parent_conversation() {
    let h = harness().await;
    let t = team(&h).await;

    let (status, conversation) = h
        .post(
            &format!("/workspaces/{}/conversations", t.workspace_id),
            &t.admin,
            json!({ "member_id": t.member_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id = conversation["id"].as_str().unwrap().to_string();

    let (_, parent) = h
        .post(
            "/messages",
            &t.member,
            json!({ "body": "ping", "workspace_id": t.workspace_id, "conversation_id": conversation_id }),
        )
        .await;
    let parent_id = parent["id"].as_str().unwrap().to_string();

    let (status, reply) = h
        .post(
            "/messages",
            &t.admin,
            json!({ "body": "pong", "workspace_id": t.workspace_id, "parent_message_id": parent_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, reply) = h.get(&format!("/messages/{}", reply["id"].as_str().unwrap()), &t.admin).await;
    assert_eq!(reply["conversation_id"].as_str(), Some(conversation_id.as_str()));
    assert_eq!(reply["parent_message_id"].as_str(), Some(parent_id.as_str()));
    assert!(reply["channel_id"].is_null());

    let (_, feed) = h
        .get(&format!("/messages?conversation_id={}", conversation_id), &t.member)
        .await;
    assert_eq!(feed["page"].as_array().unwrap().len(), 1);
    assert_eq!(feed["page"][0]["thread"]["count"], 1);
    assert_eq!(feed["page"][0]["thread"]["last_replier_name"], "Ada");

    let (_, thread) = h
        .get(&format!("/messages?parent_message_id={}", parent_id), &t.member)
        .await;
    assert_eq!(thread["page"].as_array().unwrap().len(), 1);
    assert_eq!(thread["is_done"], true);

    // A third member of the workspace can't read the private conversation.
    let outsider = user("Eve");
    let (_, ws) = h.get(&format!("/workspaces/{}", t.workspace_id), &t.admin).await;
    h.post(
        &format!("/workspaces/{}/join", t.workspace_id),
        &outsider,
        json!({ "join_code": ws["join_code"] }),
    )
    .await;
    let (status, _) = h
        .get(&format!("/messages?conversation_id={}", conversation_id), &outsider)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_members_cannot_post() {
    let h = harness().await;
    let t = team(&h).await;
    let stranger = user("Mallory");

    let (status, body) = h
        .post(
            "/messages",
            &stranger,
            json!({ "body": "hi", "workspace_id": t.workspace_id, "channel_id": t.general }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "Unauthorized");
}

#[tokio::test]
async fn reply_to_unknown_parent_is_not_found() {
    let h = harness().await;
    let t = team(&h).await;

    let (status, body) = h
        .post(
            "/messages",
            &t.member,
            json!({ "body": "hi", "workspace_id": t.workspace_id, "parent_message_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!({ "kind": "NotFound", "detail": "ParentMessage" }));
}

#[tokio::test]
async fn message_needs_exactly_one_feed() {
    let h = harness().await;
    let t = team(&h).await;

    let (status, body) = h
        .post("/messages", &t.member, json!({ "body": "hi", "workspace_id": t.workspace_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "MissingScope");

    let (status, body) = h
        .post(
            "/messages",
            &t.member,
            json!({
                "body": "hi",
                "workspace_id": t.workspace_id,
                "channel_id": t.general,
                "conversation_id": Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "AmbiguousScope");
}

#[tokio::test]
async fn admin_cannot_be_removed() {
    let h = harness().await;
    let t = team(&h).await;
    let kept = post_to_channel(&h, &t, &t.admin, "still here").await;

    let (status, body) = h.delete(&format!("/members/{}", t.admin_member), &t.member).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "AdminCannotBeRemoved");

    let (status, body) = h.delete(&format!("/members/{}", t.admin_member), &t.admin).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "CannotRemoveSelfAsAdmin");

    let (status, _) = h.get(&format!("/messages/{}", kept), &t.admin).await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = h
        .get(&format!("/workspaces/{}/members/current", t.workspace_id), &t.admin)
        .await;
    assert_eq!(me["id"].as_str(), Some(t.admin_member.as_str()));
}

#[tokio::test]
async fn removing_a_member_cascades() {
    let h = harness().await;
    let t = team(&h).await;

    let admin_message = post_to_channel(&h, &t, &t.admin, "welcome").await;
    let member_message = post_to_channel(&h, &t, &t.member, "thanks").await;
    let (status, _) = h
        .post(
            &format!("/messages/{}/reactions", admin_message),
            &t.member,
            json!({ "value": "🎉" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, conversation) = h
        .post(
            &format!("/workspaces/{}/conversations", t.workspace_id),
            &t.admin,
            json!({ "member_id": t.member_id }),
        )
        .await;

    let mut events = h.state.dispatcher.subscribe();
    let (status, _) = h.delete(&format!("/members/{}", t.member_id), &t.admin).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.get(&format!("/messages/{}", member_message), &t.admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, message) = h.get(&format!("/messages/{}", admin_message), &t.admin).await;
    assert_eq!(message["reactions"], json!([]));
    let (status, _) = h
        .get(&format!("/conversations/{}", conversation["id"].as_str().unwrap()), &t.admin)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.get(&format!("/workspaces/{}/channels", t.workspace_id), &t.member).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    match events.try_recv().unwrap() {
        FeedEvent::MemberRemoved {
            user_id,
            conversation_ids,
            ..
        } => {
            assert_eq!(user_id, t.member.id);
            assert_eq!(conversation_ids.len(), 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn pages_walk_backwards_without_overlap() {
    let h = harness().await;
    let t = team(&h).await;
    for i in 0..25 {
        post_to_channel(&h, &t, &t.admin, &format!("message {}", i)).await;
    }

    let (status, first) = h
        .get(&format!("/messages?channel_id={}&num_items=20", t.general), &t.member)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["page"].as_array().unwrap().len(), 20);
    assert_eq!(first["is_done"], false);
    let cursor = first["continue_cursor"].as_str().unwrap();

    // A new message between pages must not shift the next page.
    post_to_channel(&h, &t, &t.admin, "late").await;

    let (_, second) = h
        .get(
            &format!("/messages?channel_id={}&num_items=20&cursor={}", t.general, cursor),
            &t.member,
        )
        .await;
    assert_eq!(second["page"].as_array().unwrap().len(), 5);
    assert_eq!(second["is_done"], true);
    assert!(second["continue_cursor"].is_null());
    assert!(second["page"].as_array().unwrap().iter().all(|m| m["body"] != "late"));

    let mut ids: Vec<&str> = first["page"]
        .as_array()
        .unwrap()
        .iter()
        .chain(second["page"].as_array().unwrap())
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 25);

    let (status, body) = h
        .get(&format!("/messages?channel_id={}&cursor=!!!!", t.general), &t.member)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "InvalidCursor");
}

#[tokio::test]
async fn toggling_a_reaction_twice_restores_the_aggregate() {
    let h = harness().await;
    let t = team(&h).await;
    let id = post_to_channel(&h, &t, &t.admin, "vote").await;
    post_to_channel(&h, &t, &t.admin, "other").await;

    let (_, before) = h.get(&format!("/messages/{}", id), &t.member).await;

    let (_, first) = h
        .post(&format!("/messages/{}/reactions", id), &t.member, json!({ "value": "👍" }))
        .await;
    assert_eq!(first["added"], true);
    let (_, during) = h.get(&format!("/messages/{}", id), &t.member).await;
    assert_eq!(during["reactions"][0]["value"], "👍");
    assert_eq!(during["reactions"][0]["count"], 1);

    let (_, second) = h
        .post(&format!("/messages/{}/reactions", id), &t.member, json!({ "value": "👍" }))
        .await;
    assert_eq!(second["added"], false);
    let (_, after) = h.get(&format!("/messages/{}", id), &t.member).await;
    assert_eq!(after["reactions"], before["reactions"]);
}

#[tokio::test]
async fn only_the_author_edits_and_admins_delete() {
    let h = harness().await;
    let t = team(&h).await;
    let id = post_to_channel(&h, &t, &t.member, "draft").await;

    let (status, _) = h
        .call(Method::PATCH, &format!("/messages/{}", id), Some(&t.admin), Some(json!({ "body": "hijack" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .call(Method::PATCH, &format!("/messages/{}", id), Some(&t.member), Some(json!({ "body": "final" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, edited) = h.get(&format!("/messages/{}", id), &t.admin).await;
    assert_eq!(edited["body"], "final");
    assert!(!edited["updated_at"].is_null());

    let (status, _) = h.delete(&format!("/messages/{}", id), &t.admin).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = h.delete(&format!("/messages/{}/admin", id), &t.member).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut events = h.state.dispatcher.subscribe();
    let (status, _) = h.delete(&format!("/messages/{}/admin", id), &t.admin).await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(events.try_recv().unwrap(), FeedEvent::MessageDeleted { .. }));
}

#[tokio::test]
async fn channel_management_is_admin_only() {
    let h = harness().await;
    let t = team(&h).await;
    let uri = format!("/workspaces/{}/channels", t.workspace_id);

    let (status, _) = h.post(&uri, &t.member, json!({ "name": "random" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, channel) = h.post(&uri, &t.admin, json!({ "name": "  Release Notes " })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(channel["name"], "release-notes");

    let (status, _) = h
        .delete(&format!("/channels/{}", channel["id"].as_str().unwrap()), &t.admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, channels) = h.get(&uri, &t.member).await;
    assert_eq!(channels.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn upload_tickets_are_single_use_and_images_attach() {
    let h = harness().await;
    let t = team(&h).await;

    let (status, ticket) = h.post("/upload-url", &t.member, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let url = ticket["url"].as_str().unwrap().to_string();

    let (status, body) = h.upload(&url, "application/pdf", b"%PDF").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"]["UnsupportedContentType"], "application/pdf");

    let (status, uploaded) = h.upload(&url, "image/png", b"\x89PNG fake").await;
    assert_eq!(status, StatusCode::CREATED);
    let storage_id = uploaded["storage_id"].as_str().unwrap().to_string();

    let (status, body) = h.upload(&url, "image/png", b"\x89PNG again").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "UploadTicketSpent");

    let req = Request::builder()
        .uri(format!("/storage/{}", storage_id))
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\x89PNG fake");

    let (status, created) = h
        .post(
            "/messages",
            &t.member,
            json!({
                "body": "look",
                "image": storage_id,
                "workspace_id": t.workspace_id,
                "channel_id": t.general,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, message) = h.get(&format!("/messages/{}", created["id"].as_str().unwrap()), &t.admin).await;
    assert_eq!(
        message["image_url"].as_str(),
        Some(format!("{}/storage/{}", PUBLIC_URL, storage_id).as_str())
    );

    let (status, body) = h.delete(&format!("/files/{}", storage_id), &t.member).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["detail"], "UploadInUse");
}

#[tokio::test]
async fn unattached_uploads_can_be_discarded_by_their_owner() {
    let h = harness().await;
    let t = team(&h).await;

    let (_, ticket) = h.post("/upload-url", &t.member, json!({})).await;
    let (_, uploaded) = h.upload(ticket["url"].as_str().unwrap(), "image/jpeg", b"jpeg").await;
    let storage_id = uploaded["storage_id"].as_str().unwrap().to_string();

    let (status, _) = h.delete(&format!("/files/{}", storage_id), &t.admin).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.delete(&format!("/files/{}", storage_id), &t.member).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call(Method::GET, &format!("/storage/{}", storage_id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_messages_are_published_to_their_feed() {
    let h = harness().await;
    let t = team(&h).await;
    let mut events = h.state.dispatcher.subscribe();

    let parent = post_to_channel(&h, &t, &t.member, "question").await;
    h.post(
        "/messages",
        &t.admin,
        json!({ "body": "answer", "workspace_id": t.workspace_id, "parent_message_id": parent }),
    )
    .await;

    match events.try_recv().unwrap() {
        FeedEvent::MessageCreated { scope, message } => {
            assert_eq!(scope.to_string(), format!("channel:{}", t.general));
            assert_eq!(message.body, "question");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(events.try_recv().unwrap(), FeedEvent::MessageCreated { .. }));
    match events.try_recv().unwrap() {
        FeedEvent::ThreadUpdated { parent_id, thread, .. } => {
            assert_eq!(parent_id.to_string(), parent);
            assert_eq!(thread.count, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
