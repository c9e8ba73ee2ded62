//! Multi-step client flows that undo completed steps when a later one fails.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::api::{CreateMessageRequest, MAX_UPLOAD_SIZE, is_accepted_content_type};
use parley_types::{ChatError, DomainRule};

use crate::coordinator::{BoxFuture, Coordinator};
use crate::mutations::ChatBackend;

/// One compensatable step of a [`Saga`], operating on shared context `C`.
pub trait Step<C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn run<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<(), ChatError>>;

    /// Undo the effects of a successful `run`.
    fn compensate<'a>(&'a self, _ctx: &'a mut C) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async { Ok(()) })
    }
}

pub struct Saga<C> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: Send> Saga<C> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Run every step in order. On failure, compensate the steps that already
    /// succeeded, most recent first, and return the original error.
    pub async fn run(&self, ctx: &mut C) -> Result<(), ChatError> {
        for (i, step) in self.steps.iter().enumerate() {
            if let Err(e) = step.run(ctx).await {
                warn!("{} failed: {}", step.name(), e);
                for done in self.steps[..i].iter().rev() {
                    debug!("compensating {}", done.name());
                    if let Err(ce) = done.compensate(ctx).await {
                        warn!("compensating {} failed: {}", done.name(), ce);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<C: Send> Default for Saga<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub data: Bytes,
}

/// A message to send, optionally with an image that must be uploaded first.
#[derive(Debug, Clone)]
pub struct SendWithImage {
    pub message: CreateMessageRequest,
    pub image: Option<ImageUpload>,
}

/// State threaded through the upload-then-send steps.
pub struct UploadContext {
    pub request: SendWithImage,
    pub upload_url: Option<String>,
    pub storage_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
}

struct GenerateUploadUrl<B>(Arc<B>);

impl<B: ChatBackend> Step<UploadContext> for GenerateUploadUrl<B> {
    fn name(&self) -> &'static str {
        "generate upload url"
    }

    fn run<'a>(&'a self, ctx: &'a mut UploadContext) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            if ctx.request.image.is_some() {
                ctx.upload_url = Some(self.0.generate_upload_url().await?);
            }
            Ok(())
        })
    }
}

struct UploadImage<B>(Arc<B>);

impl<B: ChatBackend> Step<UploadContext> for UploadImage<B> {
    fn name(&self) -> &'static str {
        "upload image"
    }

    fn run<'a>(&'a self, ctx: &'a mut UploadContext) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            let (Some(image), Some(url)) = (&ctx.request.image, &ctx.upload_url) else {
                return Ok(());
            };
            if image.data.len() > MAX_UPLOAD_SIZE {
                return Err(DomainRule::UploadTooLarge(MAX_UPLOAD_SIZE).into());
            }
            if !is_accepted_content_type(&image.content_type) {
                return Err(DomainRule::UnsupportedContentType(image.content_type.clone()).into());
            }

            let storage_id = self
                .0
                .upload(url.clone(), image.content_type.clone(), image.data.clone())
                .await?;
            ctx.storage_id = Some(storage_id);
            ctx.request.message.image = Some(storage_id);
            Ok(())
        })
    }

    fn compensate<'a>(&'a self, ctx: &'a mut UploadContext) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            if let Some(storage_id) = ctx.storage_id.take() {
                ctx.request.message.image = None;
                self.0.discard_upload(storage_id).await?;
            }
            Ok(())
        })
    }
}

struct CreateMessage<B>(Arc<B>);

impl<B: ChatBackend> Step<UploadContext> for CreateMessage<B> {
    fn name(&self) -> &'static str {
        "create message"
    }

    fn run<'a>(&'a self, ctx: &'a mut UploadContext) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            let id = self.0.create_message(ctx.request.message.clone()).await?;
            ctx.message_id = Some(id);
            Ok(())
        })
    }
}

/// Upload the attached image, if any, then post the message referencing it.
/// A failed send discards the uploaded image.
pub async fn upload_and_send<B: ChatBackend>(backend: Arc<B>, request: SendWithImage) -> Result<Uuid, ChatError> {
    let saga = Saga::new()
        .step(GenerateUploadUrl(backend.clone()))
        .step(UploadImage(backend.clone()))
        .step(CreateMessage(backend));

    let mut ctx = UploadContext {
        request,
        upload_url: None,
        storage_id: None,
        message_id: None,
    };
    saga.run(&mut ctx).await?;
    ctx.message_id
        .ok_or_else(|| ChatError::internal("send finished without a message id"))
}

pub fn send_with_image<B: ChatBackend>(backend: Arc<B>) -> Coordinator<SendWithImage, Uuid> {
    Coordinator::new("send with image", move |req| upload_and_send(backend.clone(), req))
}
