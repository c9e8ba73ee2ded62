use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use parley_types::ChatError;
use parley_types::api::{
    ChannelNameRequest, CreateMessageRequest, CreateWorkspaceRequest, IdResponse, JoinWorkspaceRequest,
    ListMessagesQuery, MessagePage, OpenConversationRequest, ToggleReactionRequest, ToggleReactionResponse,
    UpdateMessageRequest, UploadResponse, UploadUrlResponse,
};
use parley_types::models::{Channel, Conversation, FeedScope, Member, MemberWithUser, Message, Workspace};

use crate::mutations::ChatBackend;
use crate::pagination::FeedSource;

#[derive(Deserialize)]
struct ErrorBody {
    error: ChatError,
}

/// REST client for a Parley server, authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.token)
    }

    fn patch(&self, path: &str) -> RequestBuilder {
        self.client.patch(self.url(path)).bearer_auth(&self.token)
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(&self.token)
    }

    // -- Workspaces --

    pub async fn create_workspace(&self, name: &str) -> Result<Workspace, ChatError> {
        let req = CreateWorkspaceRequest { name: name.into() };
        send(self.post("/workspaces").json(&req)).await
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, ChatError> {
        send(self.get("/workspaces")).await
    }

    pub async fn join_workspace(&self, workspace_id: Uuid, join_code: &str) -> Result<Member, ChatError> {
        let req = JoinWorkspaceRequest {
            join_code: join_code.into(),
        };
        send(self.post(&format!("/workspaces/{}/join", workspace_id)).json(&req)).await
    }

    // -- Channels --

    pub async fn list_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, ChatError> {
        send(self.get(&format!("/workspaces/{}/channels", workspace_id))).await
    }

    pub async fn create_channel(&self, workspace_id: Uuid, name: &str) -> Result<Channel, ChatError> {
        let req = ChannelNameRequest { name: name.into() };
        send(self.post(&format!("/workspaces/{}/channels", workspace_id)).json(&req)).await
    }

    pub async fn rename_channel(&self, channel_id: Uuid, name: &str) -> Result<Channel, ChatError> {
        let req = ChannelNameRequest { name: name.into() };
        send(self.patch(&format!("/channels/{}", channel_id)).json(&req)).await
    }

    pub async fn delete_channel(&self, channel_id: Uuid) -> Result<(), ChatError> {
        send::<IdResponse>(self.delete(&format!("/channels/{}", channel_id))).await?;
        Ok(())
    }

    // -- Conversations --

    pub async fn open_conversation(&self, workspace_id: Uuid, member_id: Uuid) -> Result<Conversation, ChatError> {
        let req = OpenConversationRequest { member_id };
        send(self.post(&format!("/workspaces/{}/conversations", workspace_id)).json(&req)).await
    }

    // -- Members --

    /// The caller's membership, or `None` when not a member.
    pub async fn current_member(&self, workspace_id: Uuid) -> Result<Option<Member>, ChatError> {
        send(self.get(&format!("/workspaces/{}/members/current", workspace_id))).await
    }

    pub async fn list_members(&self, workspace_id: Uuid) -> Result<Vec<MemberWithUser>, ChatError> {
        send(self.get(&format!("/workspaces/{}/members", workspace_id))).await
    }

    pub async fn remove_member(&self, member_id: Uuid) -> Result<(), ChatError> {
        send::<IdResponse>(self.delete(&format!("/members/{}", member_id))).await?;
        Ok(())
    }

    // -- Messages --

    pub async fn get_message(&self, id: Uuid) -> Result<Message, ChatError> {
        send(self.get(&format!("/messages/{}", id))).await
    }
}

/// Send a request and decode a JSON body. Non-2xx answers carry a
/// `{"error": ChatError}` body; anything else is an upstream failure.
async fn send<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ChatError> {
    let resp = req.send().await.map_err(ChatError::upstream)?;
    decode(resp).await
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ChatError> {
    let status = resp.status();
    let body = resp.bytes().await.map_err(ChatError::upstream)?;

    if status.is_success() {
        return serde_json::from_slice(&body).map_err(ChatError::upstream);
    }

    match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(ErrorBody { error }) => {
            debug!("server answered {}: {}", status, error);
            Err(error)
        }
        Err(_) => Err(ChatError::UpstreamIo(format!("server answered {}", status))),
    }
}

impl ChatBackend for HttpBackend {
    async fn create_message(&self, req: CreateMessageRequest) -> Result<Uuid, ChatError> {
        let IdResponse { id } = send(self.post("/messages").json(&req)).await?;
        Ok(id)
    }

    async fn update_message(&self, id: Uuid, body: String) -> Result<(), ChatError> {
        let req = UpdateMessageRequest { body };
        send::<IdResponse>(self.patch(&format!("/messages/{}", id)).json(&req)).await?;
        Ok(())
    }

    async fn remove_message(&self, id: Uuid) -> Result<(), ChatError> {
        send::<IdResponse>(self.delete(&format!("/messages/{}", id))).await?;
        Ok(())
    }

    async fn admin_remove_message(&self, id: Uuid) -> Result<(), ChatError> {
        send::<IdResponse>(self.delete(&format!("/messages/{}/admin", id))).await?;
        Ok(())
    }

    async fn toggle_reaction(&self, message_id: Uuid, value: String) -> Result<bool, ChatError> {
        let req = ToggleReactionRequest { value };
        let ToggleReactionResponse { added } =
            send(self.post(&format!("/messages/{}/reactions", message_id)).json(&req)).await?;
        Ok(added)
    }

    async fn generate_upload_url(&self) -> Result<String, ChatError> {
        let UploadUrlResponse { url } = send(self.post("/upload-url")).await?;
        Ok(url)
    }

    /// The URL itself is the credential, so no bearer token is sent.
    async fn upload(&self, url: String, content_type: String, data: Bytes) -> Result<Uuid, ChatError> {
        let resp = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(ChatError::upstream)?;

        if !resp.status().is_success() {
            return Err(ChatError::UpstreamIo(format!("upload failed: {}", resp.status())));
        }
        let UploadResponse { storage_id } = resp.json().await.map_err(ChatError::upstream)?;
        Ok(storage_id)
    }

    async fn discard_upload(&self, storage_id: Uuid) -> Result<(), ChatError> {
        send::<IdResponse>(self.delete(&format!("/files/{}", storage_id))).await?;
        Ok(())
    }
}

impl FeedSource for HttpBackend {
    async fn fetch_page(
        &self,
        scope: FeedScope,
        num_items: u32,
        cursor: Option<String>,
    ) -> Result<MessagePage, ChatError> {
        let query = ListMessagesQuery::for_scope(&scope, num_items, cursor);
        send(self.get("/messages").query(&query)).await
    }
}
