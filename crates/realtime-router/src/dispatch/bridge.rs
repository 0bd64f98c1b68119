//! Dispatch bridge
//!
//! Turns a [`Request`] into an [`Intent`], submits it to the engine and waits for the
//! single completion. Unknown and disabled actions are answered here without the engine
//! ever seeing them.

use super::{ClientInfo, Completion, DispatchEngine, Intent, Request};
use crate::action::{ActionDescriptor, ActionRegistry};
use crate::connection::ConnectionManager;
use crate::error::{RouterError, RouterResult};
use serde_json::Value;
use std::sync::Arc;

/// Bridge between the router and the dispatch engine
pub struct DispatchBridge {
    registry: Arc<ActionRegistry>,
    engine: Arc<dyn DispatchEngine>,
    connections: Arc<ConnectionManager>,
    trust_proxy: bool,
    /// Emit `[START ...]` lines
    trace_start: bool,
}

impl DispatchBridge {
    pub fn new(
        registry: Arc<ActionRegistry>,
        engine: Arc<dyn DispatchEngine>,
        connections: Arc<ConnectionManager>,
        trust_proxy: bool,
        trace_start: bool,
    ) -> Self {
        Self {
            registry,
            engine,
            connections,
            trust_proxy,
            trace_start,
        }
    }

    /// Dispatch by name; reserved names resolve through the reserved table
    pub async fn dispatch(&self, action_name: &str, request: &mut Request) -> RouterResult<Value> {
        let Some(descriptor) = self.registry.resolve(action_name) else {
            return Err(RouterError::NotFound(action_name.to_string()));
        };

        self.dispatch_to(descriptor, request).await
    }

    /// Dispatch to an already resolved action
    pub async fn dispatch_to(
        &self,
        descriptor: Arc<ActionDescriptor>,
        request: &mut Request,
    ) -> RouterResult<Value> {
        request.action = Some(descriptor.clone());

        if !self.registry.is_enabled(descriptor.name()) {
            return Err(RouterError::Disabled(descriptor.name().to_string()));
        }

        if self.trace_start && descriptor.is_debug() {
            match &request.alias {
                Some(alias) => tracing::trace!(
                    request_id = request.id(),
                    "[START {}] - {} ({})",
                    request.id(),
                    descriptor.name(),
                    alias
                ),
                None => tracing::trace!(
                    request_id = request.id(),
                    "[START {}] - {}",
                    request.id(),
                    descriptor.name()
                ),
            }
        }

        let intent = self.build_intent(&descriptor, request);
        let (completion, receiver) = Completion::channel();
        self.engine.submit(intent, completion);

        match receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RouterError::Action(e)),
            Err(_) => {
                tracing::error!(
                    request_id = request.id(),
                    action = %descriptor.name(),
                    connection_id = %request.connection.id(),
                    "Action ended without completing"
                );
                Err(RouterError::internal("The action did not complete"))
            }
        }
    }

    fn build_intent(&self, descriptor: &ActionDescriptor, request: &mut Request) -> Intent {
        let connection = request.connection.clone();
        let client = ClientInfo::resolve(
            connection.headers(),
            connection.peer_addr(),
            self.trust_proxy,
        );

        Intent::new(
            request.id(),
            descriptor.name().to_string(),
            request.alias.clone(),
            request.payload.clone(),
            client,
            connection,
            self.connections.clone(),
            request.take_extras(),
        )
    }
}

impl std::fmt::Debug for DispatchBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchBridge")
            .field("registry", &self.registry)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::dispatch::{ActionError, RequestCorrelator};
    use axum::http::HeaderMap;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// Records submitted intents and answers from a fixed script
    #[derive(Default)]
    struct ScriptedEngine {
        seen: Mutex<Vec<(String, Value, Option<Value>)>>,
        drop_completion: bool,
    }

    impl DispatchEngine for ScriptedEngine {
        fn submit(&self, intent: Intent, completion: Completion) {
            self.seen.lock().push((
                intent.action().to_string(),
                intent.payload().clone(),
                intent.extra("room").cloned(),
            ));

            if self.drop_completion {
                return;
            }
            if intent.action() == "fail" {
                completion.fail(ActionError::new("TEST.FAIL", "failed").with_status(409));
            } else {
                completion.succeed(json!({"handled": intent.action()}));
            }
        }
    }

    fn setup(engine: Arc<ScriptedEngine>) -> (DispatchBridge, Arc<ActionRegistry>, Request) {
        let registry = ActionRegistry::new_shared();
        let bridge = DispatchBridge::new(
            registry.clone(),
            engine,
            ConnectionManager::new_shared(None),
            false,
            true,
        );
        let (tx, _rx) = mpsc::channel(1);
        let connection = Connection::new("c1", HeaderMap::new(), None, tx);
        let request = Request::new(
            RequestCorrelator::new().next(),
            connection,
            Some(json!({"text": "hi"})),
        );
        (bridge, registry, request)
    }

    #[tokio::test]
    async fn test_unknown_action_never_reaches_engine() {
        let engine = Arc::new(ScriptedEngine::default());
        let (bridge, _registry, mut request) = setup(engine.clone());

        let err = bridge.dispatch("no.such.action", &mut request).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(engine.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_action() {
        let engine = Arc::new(ScriptedEngine::default());
        let (bridge, registry, mut request) = setup(engine.clone());
        registry.add_handler(ActionDescriptor::new("chat.send"));
        registry.disable("chat.send");

        let err = bridge.dispatch("chat.send", &mut request).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert!(engine.seen.lock().is_empty());

        registry.enable("chat.send");
        let value = bridge.dispatch("chat.send", &mut request).await.unwrap();
        assert_eq!(value, json!({"handled": "chat.send"}));
    }

    #[tokio::test]
    async fn test_extras_move_into_intent() {
        let engine = Arc::new(ScriptedEngine::default());
        let (bridge, registry, mut request) = setup(engine.clone());
        registry.add_handler(ActionDescriptor::new("ws#room.join"));
        request.set_extra("room", json!("lobby"));

        bridge.dispatch("ws#room.join", &mut request).await.unwrap();

        assert!(request.extras.is_empty());
        assert_eq!(request.action_name(), "ws#room.join");
        let seen = engine.seen.lock();
        assert_eq!(seen[0].1, json!({"text": "hi"}));
        assert_eq!(seen[0].2, Some(json!("lobby")));
    }

    #[tokio::test]
    async fn test_action_error_passes_through() {
        let engine = Arc::new(ScriptedEngine::default());
        let (bridge, registry, mut request) = setup(engine);
        registry.add_handler(ActionDescriptor::new("fail"));

        let err = bridge.dispatch("fail", &mut request).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "TEST.FAIL");
    }

    #[tokio::test]
    async fn test_dropped_completion_is_internal() {
        let engine = Arc::new(ScriptedEngine {
            drop_completion: true,
            ..ScriptedEngine::default()
        });
        let (bridge, registry, mut request) = setup(engine);
        registry.add_handler(ActionDescriptor::new("chat.send"));

        let err = bridge.dispatch("chat.send", &mut request).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "TRANSPORT.ERROR");
    }
}
