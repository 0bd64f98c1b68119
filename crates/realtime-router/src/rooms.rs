//! Room state machine
//!
//! Join, leave and clear for one connection. Idempotent requests (joining a joined room,
//! leaving a room the connection is not in, clearing with no rooms) succeed without any
//! dispatch, so handlers only ever see real transitions. Room operations on one connection
//! are serialized by its room guard.

use crate::action::ActionRegistry;
use crate::connection::ConnectionManager;
use crate::dispatch::{DispatchBridge, Request};
use crate::error::{RouterError, RouterResult};
use crate::protocol::{ReservedAction, ROOM_CLEAR_EVENT, ROOM_JOIN_EVENT, ROOM_LEAVE_EVENT};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Membership transition requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomOp {
    Join,
    Leave,
}

impl RoomOp {
    fn reserved(self) -> ReservedAction {
        match self {
            Self::Join => ReservedAction::RoomJoin,
            Self::Leave => ReservedAction::RoomLeave,
        }
    }

    fn event(self) -> &'static str {
        match self {
            Self::Join => ROOM_JOIN_EVENT,
            Self::Leave => ROOM_LEAVE_EVENT,
        }
    }

    /// Whether the connection is already in the requested state
    fn is_settled(self, is_member: bool) -> bool {
        match self {
            Self::Join => is_member,
            Self::Leave => !is_member,
        }
    }
}

/// Runs room operations against the registry and the connection manager
pub struct RoomStateMachine {
    registry: Arc<ActionRegistry>,
    bridge: Arc<DispatchBridge>,
    connections: Arc<ConnectionManager>,
}

impl RoomStateMachine {
    pub fn new(
        registry: Arc<ActionRegistry>,
        bridge: Arc<DispatchBridge>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            registry,
            bridge,
            connections,
        }
    }

    pub async fn join(&self, request: &mut Request, room: Option<&str>) -> RouterResult<Value> {
        self.transition(RoomOp::Join, request, room).await
    }

    pub async fn leave(&self, request: &mut Request, room: Option<&str>) -> RouterResult<Value> {
        self.transition(RoomOp::Leave, request, room).await
    }

    async fn transition(
        &self,
        op: RoomOp,
        request: &mut Request,
        room: Option<&str>,
    ) -> RouterResult<Value> {
        let Some(room) = room.filter(|r| !r.is_empty()) else {
            return Err(RouterError::InvalidRoomName);
        };
        request.alias = Some(room.to_string());

        let connection = request.connection.clone();
        let _guard = connection.lock_rooms().await;

        let route = self.registry.room_action(op.reserved(), room);
        if let Some((descriptor, _)) = &route {
            request.action = Some(descriptor.clone());
        }

        if op.is_settled(connection.is_member(room)) {
            return Ok(merge_result(op.event(), Some(room), Value::Null));
        }

        let Some((descriptor, params)) = route else {
            return Err(RouterError::RoomUnavailable(op.reserved().name().to_string()));
        };

        request.set_extra("room", json!(room));
        if !params.is_empty() {
            request.set_extra("params", json!(params));
        }

        let result = self.bridge.dispatch_to(descriptor, request).await?;

        // The handler may already have moved the connection
        if !op.is_settled(connection.is_member(room)) {
            let primitive = match op {
                RoomOp::Join => self.connections.join_room(&connection, room).await,
                RoomOp::Leave => self.connections.leave_room(&connection, room).await,
            };

            if let Err(e) = primitive {
                tracing::warn!(
                    request_id = request.id(),
                    connection_id = %connection.id(),
                    room = %room,
                    error = %e,
                    "Room primitive failed"
                );
                return Err(RouterError::RoomPrimitive {
                    room: room.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(merge_result(op.event(), Some(room), result))
    }

    /// Leave every joined room
    pub async fn clear(&self, request: &mut Request) -> RouterResult<Value> {
        request.alias = Some(ROOM_CLEAR_EVENT.to_string());

        let connection = request.connection.clone();
        let _guard = connection.lock_rooms().await;

        let descriptor = self.registry.reserved(ReservedAction::RoomClear);
        if let Some(descriptor) = &descriptor {
            request.action = Some(descriptor.clone());
        }

        if connection.room_count() == 0 {
            return Ok(merge_result(ROOM_CLEAR_EVENT, None, Value::Null));
        }

        let Some(descriptor) = descriptor else {
            return Err(RouterError::RoomUnavailable(
                ReservedAction::RoomClear.name().to_string(),
            ));
        };

        let result = self.bridge.dispatch_to(descriptor, request).await?;

        let rooms = connection.rooms();
        let outcomes = join_all(
            rooms
                .iter()
                .map(|room| self.connections.leave_room(&connection, room)),
        )
        .await;

        let failed: Vec<String> = rooms
            .into_iter()
            .zip(outcomes)
            .filter_map(|(room, outcome)| {
                outcome.err().map(|e| {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        room = %room,
                        error = %e,
                        "Could not leave room during clear"
                    );
                    room
                })
            })
            .collect();

        if !failed.is_empty() {
            return Err(RouterError::RoomClear { failed });
        }

        Ok(merge_result(ROOM_CLEAR_EVENT, None, result))
    }
}

impl std::fmt::Debug for RoomStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStateMachine")
            .field("registry", &self.registry)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

/// Tag a handler result with the room event: objects gain `type` (and `room` unless set),
/// `null` becomes the bare tag, other values are nested under `result`
fn merge_result(event: &str, room: Option<&str>, result: Value) -> Value {
    let mut object = match result {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };

    object.insert("type".to_string(), json!(event));
    if let Some(room) = room {
        object
            .entry("room")
            .or_insert_with(|| Value::String(room.to_string()));
    }

    Value::Object(object)
}
