//! Router
//!
//! Owns the registry, the connection table and the dispatch machinery, and routes client
//! frames to them. Transports hand the router new connections and decoded frames; the host
//! registers actions, toggles them and emits server-originated events.

use crate::action::{ActionDescriptor, ActionRegistry};
use crate::adapter::Adapter;
use crate::auth::{AuthorizationResolver, HeaderTokenResolver};
use crate::broadcast::{Fanout, FanoutReport, PendingQueue, RelayDispatcher};
use crate::connection::{Connection, ConnectionManager};
use crate::dispatch::{DispatchBridge, DispatchEngine, Request, RequestCorrelator};
use crate::error::{RouterError, RouterResult};
use crate::events::EventEnvelope;
use crate::protocol::{
    ClientFrame, ReservedAction, ServerFrame, ROOM_CLEAR_EVENT, ROOM_JOIN_EVENT, ROOM_LEAVE_EVENT,
};
use crate::response::ResponseFormatter;
use crate::rooms::RoomStateMachine;
use axum::http::HeaderMap;
use realtime_common::RouterConfig;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Router behavior switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    /// Multiplexed channel carrying `{type, payload}` messages
    pub action_name: String,
    /// Timing lines for debug actions
    pub debug: bool,
    /// Take the client address from `x-forwarded-for`
    pub trust_proxy: bool,
    /// Suppresses `[START ...]` lines
    pub production: bool,
}

impl RouterOptions {
    #[must_use]
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            action_name: config.ws.action_name.clone(),
            debug: config.ws.debug,
            trust_proxy: config.ws.trust_proxy,
            production: config.app.env.is_production(),
        }
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Builder for [`Router`]
pub struct RouterBuilder {
    engine: Arc<dyn DispatchEngine>,
    resolver: Arc<dyn AuthorizationResolver>,
    adapter: Option<Arc<dyn Adapter>>,
    options: RouterOptions,
}

impl RouterBuilder {
    pub fn new(engine: Arc<dyn DispatchEngine>) -> Self {
        Self {
            engine,
            resolver: Arc::new(HeaderTokenResolver::default()),
            adapter: None,
            options: RouterOptions::default(),
        }
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn AuthorizationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Pub/sub adapter; `None` keeps fan-out local
    #[must_use]
    pub fn adapter(mut self, adapter: Option<Arc<dyn Adapter>>) -> Self {
        self.adapter = adapter;
        self
    }

    #[must_use]
    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn config(self, config: &RouterConfig) -> Self {
        self.options(RouterOptions::from_config(config))
    }

    #[must_use]
    pub fn action_name(mut self, name: impl Into<String>) -> Self {
        self.options.action_name = name.into();
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    #[must_use]
    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.options.trust_proxy = trust_proxy;
        self
    }

    pub fn build(self) -> Arc<Router> {
        let options = self.options;
        let registry = ActionRegistry::new_shared();
        registry.reserve_channel(&options.action_name);
        let connections = ConnectionManager::new_shared(self.adapter.clone());
        let bridge = Arc::new(DispatchBridge::new(
            registry.clone(),
            self.engine,
            connections.clone(),
            options.trust_proxy,
            options.debug && !options.production,
        ));
        let rooms = RoomStateMachine::new(registry.clone(), bridge.clone(), connections.clone());
        let fanout = Fanout::new(connections.clone());
        let relay = self
            .adapter
            .map(|adapter| Arc::new(RelayDispatcher::new(adapter, fanout.clone())));

        Arc::new(Router {
            formatter: ResponseFormatter::new(options.debug),
            options,
            registry,
            connections,
            correlator: Arc::new(RequestCorrelator::new()),
            bridge,
            rooms,
            resolver: self.resolver,
            fanout,
            pending: PendingQueue::new(),
            relay,
        })
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("options", &self.options)
            .field("adapter", &self.adapter.as_ref().map(|a| a.name().to_string()))
            .finish_non_exhaustive()
    }
}

/// Realtime event router
pub struct Router {
    options: RouterOptions,
    registry: Arc<ActionRegistry>,
    connections: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
    bridge: Arc<DispatchBridge>,
    rooms: RoomStateMachine,
    formatter: ResponseFormatter,
    resolver: Arc<dyn AuthorizationResolver>,
    fanout: Fanout,
    /// Envelopes emitted before `attach`
    pending: PendingQueue<EventEnvelope>,
    relay: Option<Arc<RelayDispatcher>>,
}

impl Router {
    pub fn builder(engine: Arc<dyn DispatchEngine>) -> RouterBuilder {
        RouterBuilder::new(engine)
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// Register an action
    pub fn add_handler(&self, descriptor: ActionDescriptor) -> bool {
        self.registry.add_handler(descriptor)
    }

    /// Route the alias channel `alias` to `action`
    pub fn add_alias(&self, action: &str, alias: &str) -> bool {
        self.registry.alias_action(action, alias)
    }

    pub fn disable(&self, action: &str) {
        self.registry.disable(action);
    }

    pub fn enable(&self, action: &str) {
        self.registry.enable(action);
    }

    pub fn is_ready(&self) -> bool {
        self.pending.is_ready()
    }

    /// Send a server-originated event.
    ///
    /// Before [`attach`](Self::attach) the envelope is buffered and `None` is returned.
    pub async fn emit(&self, envelope: EventEnvelope) -> Option<FanoutReport> {
        let envelope = self.pending.push_or_pass(envelope).await?;
        Some(self.fanout.deliver(&envelope).await)
    }

    /// Mark the router ready: flush buffered emits in order and start relaying adapter
    /// packets. Returns the number of flushed envelopes.
    pub async fn attach(&self) -> usize {
        let fanout = &self.fanout;
        let flushed = self
            .pending
            .drain_with(|envelope| async move {
                fanout.deliver(&envelope).await;
            })
            .await;

        if let Some(relay) = &self.relay {
            relay.clone().start();
        }

        tracing::info!(flushed = flushed, "Router attached");
        flushed
    }

    /// Stop relaying adapter packets
    pub fn shutdown(&self) {
        if let Some(relay) = &self.relay {
            relay.stop();
        }
    }

    /// Authorize a new connection and run the connect action.
    ///
    /// The connection becomes visible to routing only when this returns `Ok`.
    pub async fn open_connection(
        &self,
        headers: HeaderMap,
        peer_addr: Option<SocketAddr>,
        sender: mpsc::Sender<ServerFrame>,
    ) -> RouterResult<Arc<Connection>> {
        let credential = match self.resolver.resolve(&headers).await {
            Ok(credential) => credential,
            Err(e) => {
                let error = RouterError::from(e);
                tracing::debug!(
                    peer_addr = ?peer_addr,
                    status = error.status_code(),
                    error = %error,
                    "Connection rejected"
                );
                return Err(error);
            }
        };

        let connection = Connection::new(uuid::Uuid::new_v4().to_string(), headers, peer_addr, sender);
        connection.set_authorization(credential);

        if let Some(descriptor) = self.registry.reserved(ReservedAction::Connect) {
            let mut request = Request::new(self.correlator.next(), connection.clone(), None);
            let outcome = self.bridge.dispatch_to(descriptor, &mut request).await;
            self.formatter.log(&request, &outcome);

            if let Err(e) = outcome {
                tracing::debug!(
                    connection_id = %connection.id(),
                    status = e.status_code(),
                    error = %e,
                    "Connect action rejected connection"
                );
                connection.mark_dead();
                connection.teardown();
                return Err(e);
            }
        }

        self.connections.add(connection.clone());
        tracing::info!(
            connection_id = %connection.id(),
            peer_addr = ?connection.peer_addr(),
            "Connection established"
        );

        Ok(connection)
    }

    /// Tear a connection down. Only the first call has any effect.
    pub async fn disconnect(&self, connection: &Arc<Connection>) {
        if !connection.mark_dead() {
            return;
        }
        self.connections.remove(connection.id());

        if connection.is_authorized() {
            if let Some(descriptor) = self.registry.reserved(ReservedAction::Disconnect) {
                let mut request = Request::new(self.correlator.next(), connection.clone(), None);
                let outcome = self.bridge.dispatch_to(descriptor, &mut request).await;
                self.formatter.log(&request, &outcome);
            }
        }

        connection.teardown();

        let _guard = connection.lock_rooms().await;
        self.connections.leave_all(connection).await;

        tracing::info!(
            connection_id = %connection.id(),
            connected_ms = %connection.connection_time().as_millis(),
            "Connection closed"
        );
    }

    /// Report a transport error to the error action, without waiting for it
    pub fn report_error(&self, connection: &Arc<Connection>, message: &str) {
        let Some(descriptor) = self.registry.reserved(ReservedAction::Error) else {
            tracing::debug!(connection_id = %connection.id(), error = %message, "Transport error");
            return;
        };

        let mut request = Request::new(
            self.correlator.next(),
            connection.clone(),
            Some(json!({ "message": message })),
        );
        let bridge = self.bridge.clone();
        let formatter = self.formatter;
        tokio::spawn(async move {
            let outcome = bridge.dispatch_to(descriptor, &mut request).await;
            formatter.log(&request, &outcome);
        });
    }

    /// Route one client frame and reply through its ack
    pub async fn handle_frame(&self, connection: &Arc<Connection>, frame: ClientFrame) {
        if !connection.is_alive() {
            return;
        }

        let stamp = self.correlator.next();
        let ack = frame.ack;

        let (request, outcome) = match frame.event.as_str() {
            event if event == self.options.action_name => {
                let Some((action, payload)) = multiplexed(&frame) else {
                    tracing::debug!(
                        connection_id = %connection.id(),
                        "Ignoring action frame without a type"
                    );
                    return;
                };

                let mut request = Request::new(stamp, connection.clone(), payload).with_ack(ack);
                let outcome = match self.registry.resolve_client(&action) {
                    Some(descriptor) => self.bridge.dispatch_to(descriptor, &mut request).await,
                    None => Err(RouterError::NotFound(action)),
                };
                (request, outcome)
            }
            ROOM_JOIN_EVENT | ROOM_LEAVE_EVENT => {
                let room = frame.arg(0).and_then(Value::as_str);
                let mut request =
                    Request::new(stamp, connection.clone(), frame.arg(1).cloned()).with_ack(ack);
                let outcome = if frame.event == ROOM_JOIN_EVENT {
                    self.rooms.join(&mut request, room).await
                } else {
                    self.rooms.leave(&mut request, room).await
                };
                (request, outcome)
            }
            ROOM_CLEAR_EVENT => {
                let mut request =
                    Request::new(stamp, connection.clone(), frame.arg(0).cloned()).with_ack(ack);
                let outcome = self.rooms.clear(&mut request).await;
                (request, outcome)
            }
            alias => {
                let mut request = Request::new(stamp, connection.clone(), frame.arg(0).cloned())
                    .with_ack(ack)
                    .with_alias(alias);
                let outcome = match self.registry.resolve_alias(alias) {
                    Some(descriptor) => self.bridge.dispatch_to(descriptor, &mut request).await,
                    None if ack.is_some() => Err(RouterError::NotFound(alias.to_string())),
                    None => {
                        tracing::trace!(
                            connection_id = %connection.id(),
                            event = %alias,
                            "Ignoring frame on unknown channel"
                        );
                        return;
                    }
                };
                (request, outcome)
            }
        };

        self.formatter.respond(request, outcome).await;
    }
}

/// Action name and payload of a `{type, payload}` message
fn multiplexed(frame: &ClientFrame) -> Option<(String, Option<Value>)> {
    let message = frame.arg(0)?.as_object()?;
    let action = message
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())?;

    Some((action.to_string(), message.get("payload").cloned()))
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("connections", &self.connections)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplexed_frame() {
        let frame = ClientFrame::new(
            "dispatch",
            vec![json!({"type": "chat.send", "payload": {"text": "hi"}})],
        );
        assert_eq!(
            multiplexed(&frame),
            Some(("chat.send".to_string(), Some(json!({"text": "hi"}))))
        );
    }

    #[test]
    fn test_multiplexed_frame_requires_type() {
        assert!(multiplexed(&ClientFrame::new("dispatch", vec![])).is_none());
        assert!(multiplexed(&ClientFrame::new("dispatch", vec![json!({"type": ""})])).is_none());
        assert!(multiplexed(&ClientFrame::new("dispatch", vec![json!({"type": 3})])).is_none());
        assert!(multiplexed(&ClientFrame::new("dispatch", vec![json!("chat.send")])).is_none());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = RouterConfig::default();
        config.ws.action_name = "rpc".into();
        config.ws.trust_proxy = true;

        let options = RouterOptions::from_config(&config);
        assert_eq!(options.action_name, "rpc");
        assert!(options.trust_proxy);
        assert!(!options.production);
    }
}
