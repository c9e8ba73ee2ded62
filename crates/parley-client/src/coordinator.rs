//! Per-mutation state tracking with success/error/settled callbacks.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use parley_types::ChatError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
    Settled,
}

/// Callbacks and failure mode for one `mutate` call.
pub struct MutateOptions<T> {
    pub on_success: Option<Box<dyn FnOnce(&T) + Send>>,
    pub on_error: Option<Box<dyn FnOnce(&ChatError) + Send>>,
    pub on_settled: Option<Box<dyn FnOnce() + Send>>,
    /// Return the failure as `Err` instead of resolving to `Ok(None)`.
    pub throw_error: bool,
}

impl<T> Default for MutateOptions<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_settled: None,
            throw_error: false,
        }
    }
}

impl<T> MutateOptions<T> {
    pub fn on_success(mut self, f: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&ChatError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_settled(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_settled = Some(Box::new(f));
        self
    }

    pub fn throw_error(mut self) -> Self {
        self.throw_error = true;
        self
    }
}

struct Snapshot<T> {
    status: MutationStatus,
    data: Option<T>,
    error: Option<ChatError>,
}

type Action<P, T> = dyn Fn(P) -> BoxFuture<'static, Result<T, ChatError>> + Send + Sync;

/// Wraps one remote mutation and tracks its latest attempt.
///
/// Clones share the tracked state. A second `mutate` while one is in flight
/// starts an independent attempt; whichever finishes last wins the snapshot.
pub struct Coordinator<P, T> {
    name: &'static str,
    action: Arc<Action<P, T>>,
    state: Arc<Mutex<Snapshot<T>>>,
}

impl<P, T> Clone for Coordinator<P, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            action: self.action.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P, T> Coordinator<P, T>
where
    P: Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, action: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ChatError>> + Send + 'static,
    {
        Self {
            name,
            action: Arc::new(move |payload| -> BoxFuture<'static, Result<T, ChatError>> {
                Box::pin(action(payload))
            }),
            state: Arc::new(Mutex::new(Snapshot {
                status: MutationStatus::Idle,
                data: None,
                error: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot<T>> {
        // A panicking callback must not wedge the coordinator.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn mutate(&self, payload: P, opts: MutateOptions<T>) -> Result<Option<T>, ChatError> {
        {
            let mut s = self.lock();
            s.status = MutationStatus::Pending;
            s.data = None;
            s.error = None;
        }

        let result = (self.action)(payload).await;

        let outcome = match result {
            Ok(data) => {
                {
                    let mut s = self.lock();
                    s.status = MutationStatus::Success;
                    s.data = Some(data.clone());
                }
                if let Some(f) = opts.on_success {
                    f(&data);
                }
                Ok(Some(data))
            }
            Err(e) => {
                debug!("{}: {}", self.name, e);
                {
                    let mut s = self.lock();
                    s.status = MutationStatus::Error;
                    s.error = Some(e.clone());
                }
                if let Some(f) = opts.on_error {
                    f(&e);
                }
                if opts.throw_error { Err(e) } else { Ok(None) }
            }
        };

        self.lock().status = MutationStatus::Settled;
        if let Some(f) = opts.on_settled {
            f();
        }
        outcome
    }

    pub fn status(&self) -> MutationStatus {
        self.lock().status
    }

    pub fn data(&self) -> Option<T> {
        self.lock().data.clone()
    }

    pub fn error(&self) -> Option<ChatError> {
        self.lock().error.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == MutationStatus::Pending
    }

    /// Settled after a successful attempt.
    pub fn is_success(&self) -> bool {
        let s = self.lock();
        s.status != MutationStatus::Pending && s.data.is_some()
    }

    /// Settled after a failed attempt.
    pub fn is_error(&self) -> bool {
        let s = self.lock();
        s.status != MutationStatus::Pending && s.error.is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.status() == MutationStatus::Settled
    }
}
