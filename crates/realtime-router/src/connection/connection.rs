//! Individual socket connection
//!
//! Holds everything the router tracks about one client: handshake headers, the resolved
//! credential, the data bag, joined rooms and whether the socket is still alive.

use crate::auth::Credential;
use crate::protocol::ServerFrame;
use axum::http::HeaderMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Credential slot; once dropped it cannot be set again
#[derive(Debug, Clone)]
enum AuthSlot {
    Unset,
    Set(Credential),
    Dropped,
}

/// A single client connection
pub struct Connection {
    /// Unique connection id
    id: String,

    /// Headers presented at handshake
    headers: HeaderMap,

    /// Raw peer address
    peer_addr: Option<SocketAddr>,

    /// Channel to the socket writer task
    sender: mpsc::Sender<ServerFrame>,

    /// Cleared once the socket is gone
    alive: AtomicBool,

    authorization: RwLock<AuthSlot>,

    /// Application data bag, `None` after teardown
    data: RwLock<Option<Map<String, Value>>>,

    /// Rooms this connection has joined
    rooms: RwLock<HashSet<String>>,

    /// Serializes room membership changes
    room_guard: Mutex<()>,

    connected_at: Instant,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        id: impl Into<String>,
        headers: HeaderMap,
        peer_addr: Option<SocketAddr>,
        sender: mpsc::Sender<ServerFrame>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            headers,
            peer_addr,
            sender,
            alive: AtomicBool::new(true),
            authorization: RwLock::new(AuthSlot::Unset),
            data: RwLock::new(Some(Map::new())),
            rooms: RwLock::new(HashSet::new()),
            room_guard: Mutex::new(()),
            connected_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the connection dead. Returns `true` only for the first call.
    pub fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    /// Attach the resolved credential. Only the first call has any effect.
    pub fn set_authorization(&self, credential: Credential) -> bool {
        let mut slot = self.authorization.write();
        match *slot {
            AuthSlot::Unset => {
                *slot = AuthSlot::Set(credential);
                true
            }
            AuthSlot::Set(_) | AuthSlot::Dropped => {
                tracing::debug!(connection_id = %self.id, "Authorization already set, ignoring");
                false
            }
        }
    }

    pub fn authorization(&self) -> Option<Credential> {
        match &*self.authorization.read() {
            AuthSlot::Set(credential) => Some(credential.clone()),
            AuthSlot::Unset | AuthSlot::Dropped => None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(*self.authorization.read(), AuthSlot::Set(_))
    }

    /// Forget the credential and the data bag
    pub(crate) fn teardown(&self) {
        *self.authorization.write() = AuthSlot::Dropped;
        *self.data.write() = None;
    }

    /// Whole data bag
    pub fn data(&self) -> Option<Map<String, Value>> {
        self.data.read().clone()
    }

    /// Single value from the data bag
    pub fn data_value(&self, key: &str) -> Option<Value> {
        self.data.read().as_ref()?.get(key).cloned()
    }

    /// Set one key; ignored once the connection is torn down
    pub fn set_data(&self, key: impl Into<String>, value: Value) -> bool {
        match self.data.write().as_mut() {
            Some(data) => {
                data.insert(key.into(), value);
                true
            }
            None => false,
        }
    }

    /// Replace the whole bag
    pub fn replace_data(&self, data: Map<String, Value>) -> bool {
        let mut slot = self.data.write();
        if slot.is_none() {
            return false;
        }
        *slot = Some(data);
        true
    }

    pub fn clear_data(&self) {
        if let Some(data) = self.data.write().as_mut() {
            data.clear();
        }
    }

    pub fn is_member(&self, room: &str) -> bool {
        self.rooms.read().contains(room)
    }

    pub fn rooms(&self) -> Vec<String> {
        self.rooms.read().iter().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    pub(crate) fn insert_room(&self, room: &str) -> bool {
        self.rooms.write().insert(room.to_string())
    }

    pub(crate) fn remove_room(&self, room: &str) -> bool {
        self.rooms.write().remove(room)
    }

    /// Hold while a room operation is in progress
    pub(crate) async fn lock_rooms(&self) -> MutexGuard<'_, ()> {
        self.room_guard.lock().await
    }

    /// Time since the handshake completed
    pub fn connection_time(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Send a frame to the socket writer
    pub async fn send(&self, frame: ServerFrame) -> Result<(), mpsc::error::SendError<ServerFrame>> {
        self.sender.send(frame).await
    }

}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("alive", &self.is_alive())
            .field("rooms", &self.room_count())
            .finish()
    }
}
