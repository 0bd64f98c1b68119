//! Dispatch engine seam
//!
//! The router hands each intent to a [`DispatchEngine`] together with a one-shot
//! [`Completion`]. [`HandlerEngine`] is the in-process implementation: a table of async
//! handlers keyed by action name.

use super::Intent;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Failure reported by an action handler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    /// Dotted error code, e.g. `CHAT.MUTED`
    pub code: String,
    pub message: String,
    pub status: u16,
    pub data: Option<Value>,
}

impl ActionError {
    /// New error with status 400
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: 400,
            data: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Outcome of one action
pub type ActionResult = Result<Value, ActionError>;

/// Receiving half of a completion
pub type CompletionReceiver = oneshot::Receiver<ActionResult>;

/// One-shot completion for a submitted intent. Consumed on use, so it fires at most once.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<ActionResult>,
}

impl Completion {
    pub fn channel() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn complete(self, result: ActionResult) {
        // The waiting side may already be gone
        let _ = self.tx.send(result);
    }

    pub fn succeed(self, value: Value) {
        self.complete(Ok(value));
    }

    pub fn fail(self, error: ActionError) {
        self.complete(Err(error));
    }
}

/// Executes intents
pub trait DispatchEngine: Send + Sync {
    /// Start executing `intent`; `completion` must be completed or dropped exactly once
    fn submit(&self, intent: Intent, completion: Completion);
}

/// Async handler for one action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, intent: Intent) -> ActionResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Intent) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send,
{
    async fn handle(&self, intent: Intent) -> ActionResult {
        (self.0)(intent).await
    }
}

/// In-process engine running registered handlers on the tokio runtime
#[derive(Default)]
pub struct HandlerEngine {
    handlers: DashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a handler under an action name, replacing any previous one
    pub fn register(&self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action.into(), handler);
    }

    /// Register an async closure
    pub fn register_fn<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(Intent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.register(action, Arc::new(FnHandler(handler)));
    }

    #[cfg(test)]
    fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl DispatchEngine for HandlerEngine {
    fn submit(&self, intent: Intent, completion: Completion) {
        let Some(handler) = self.handlers.get(intent.action()).map(|h| h.clone()) else {
            completion.fail(
                ActionError::new("TRANSPORT.NOT_FOUND", "The requested action has no handler")
                    .with_status(404),
            );
            return;
        };

        tokio::spawn(async move {
            let request_id = intent.id();
            let action = intent.action().to_string();

            match AssertUnwindSafe(handler.handle(intent)).catch_unwind().await {
                Ok(result) => completion.complete(result),
                Err(_) => {
                    // Dropping the completion surfaces as an internal error
                    tracing::error!(request_id = request_id, action = %action, "Action handler panicked");
                }
            }
        });
    }
}

impl std::fmt::Debug for HandlerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEngine")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
