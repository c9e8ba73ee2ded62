use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use parley_types::ChatError;
use parley_types::api::CreateMessageRequest;

use crate::coordinator::Coordinator;

/// The remote operations the client mutates through.
pub trait ChatBackend: Send + Sync + 'static {
    fn create_message(&self, req: CreateMessageRequest) -> impl Future<Output = Result<Uuid, ChatError>> + Send;

    fn update_message(&self, id: Uuid, body: String) -> impl Future<Output = Result<(), ChatError>> + Send;

    fn remove_message(&self, id: Uuid) -> impl Future<Output = Result<(), ChatError>> + Send;

    fn admin_remove_message(&self, id: Uuid) -> impl Future<Output = Result<(), ChatError>> + Send;

    /// Returns whether the reaction is now present.
    fn toggle_reaction(&self, message_id: Uuid, value: String) -> impl Future<Output = Result<bool, ChatError>> + Send;

    /// A single-use URL the next upload is POSTed to.
    fn generate_upload_url(&self) -> impl Future<Output = Result<String, ChatError>> + Send;

    fn upload(
        &self,
        url: String,
        content_type: String,
        data: Bytes,
    ) -> impl Future<Output = Result<Uuid, ChatError>> + Send;

    /// Throw away an uploaded file no message refers to.
    fn discard_upload(&self, storage_id: Uuid) -> impl Future<Output = Result<(), ChatError>> + Send;
}

#[derive(Debug, Clone)]
pub struct EditMessage {
    pub id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ToggleReaction {
    pub message_id: Uuid,
    pub value: String,
}

pub fn send_message<B: ChatBackend>(backend: Arc<B>) -> Coordinator<CreateMessageRequest, Uuid> {
    Coordinator::new("send message", move |req| {
        let backend = backend.clone();
        async move { backend.create_message(req).await }
    })
}

pub fn edit_message<B: ChatBackend>(backend: Arc<B>) -> Coordinator<EditMessage, ()> {
    Coordinator::new("edit message", move |edit: EditMessage| {
        let backend = backend.clone();
        async move { backend.update_message(edit.id, edit.body).await }
    })
}

pub fn remove_message<B: ChatBackend>(backend: Arc<B>) -> Coordinator<Uuid, ()> {
    Coordinator::new("remove message", move |id| {
        let backend = backend.clone();
        async move { backend.remove_message(id).await }
    })
}

pub fn admin_remove_message<B: ChatBackend>(backend: Arc<B>) -> Coordinator<Uuid, ()> {
    Coordinator::new("admin remove message", move |id| {
        let backend = backend.clone();
        async move { backend.admin_remove_message(id).await }
    })
}

pub fn toggle_reaction<B: ChatBackend>(backend: Arc<B>) -> Coordinator<ToggleReaction, bool> {
    Coordinator::new("toggle reaction", move |t: ToggleReaction| {
        let backend = backend.clone();
        async move { backend.toggle_reaction(t.message_id, t.value).await }
    })
}

pub fn generate_upload_url<B: ChatBackend>(backend: Arc<B>) -> Coordinator<(), String> {
    Coordinator::new("generate upload url", move |_| {
        let backend = backend.clone();
        async move { backend.generate_upload_url().await }
    })
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory backend recording every call, for client tests.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: Mutex<Vec<String>>,
        pub messages: Mutex<Vec<CreateMessageRequest>>,
        pub reactions: Mutex<HashSet<(Uuid, String)>>,
        pub fail_upload: Mutex<Option<ChatError>>,
        pub fail_create: Mutex<Option<ChatError>>,
    }

    impl FakeBackend {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ChatBackend for FakeBackend {
        async fn create_message(&self, req: CreateMessageRequest) -> Result<Uuid, ChatError> {
            self.record("create_message");
            if let Some(e) = self.fail_create.lock().unwrap().take() {
                return Err(e);
            }
            self.messages.lock().unwrap().push(req);
            Ok(Uuid::new_v4())
        }

        async fn update_message(&self, id: Uuid, _body: String) -> Result<(), ChatError> {
            self.record(format!("update_message {}", id));
            Ok(())
        }

        async fn remove_message(&self, id: Uuid) -> Result<(), ChatError> {
            self.record(format!("remove_message {}", id));
            Ok(())
        }

        async fn admin_remove_message(&self, id: Uuid) -> Result<(), ChatError> {
            self.record(format!("admin_remove_message {}", id));
            Ok(())
        }

        async fn toggle_reaction(&self, message_id: Uuid, value: String) -> Result<bool, ChatError> {
            self.record("toggle_reaction");
            let mut reactions = self.reactions.lock().unwrap();
            let key = (message_id, value);
            if reactions.remove(&key) {
                Ok(false)
            } else {
                reactions.insert(key);
                Ok(true)
            }
        }

        async fn generate_upload_url(&self) -> Result<String, ChatError> {
            self.record("generate_upload_url");
            Ok("http://parley.test/uploads/ticket".into())
        }

        async fn upload(&self, _url: String, _content_type: String, _data: Bytes) -> Result<Uuid, ChatError> {
            self.record("upload");
            match self.fail_upload.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(Uuid::new_v4()),
            }
        }

        async fn discard_upload(&self, storage_id: Uuid) -> Result<(), ChatError> {
            self.record(format!("discard_upload {}", storage_id));
            Ok(())
        }
    }
}
