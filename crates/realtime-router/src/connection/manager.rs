//! Connection manager
//!
//! Tracks live connections and the local room index. Room primitives here are the raw
//! subscribe/unsubscribe operations: they update both the connection record and the index,
//! and tell the adapter when a room gains its first or loses its last local member.
//! Membership changes to one room, adapter call included, run under that room's lock.

use super::Connection;
use crate::adapter::{Adapter, AdapterError};
use crate::protocol::ServerFrame;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

type RoomLock = Arc<Mutex<()>>;

/// Room primitive failures
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Connection {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Manages all admitted connections
pub struct ConnectionManager {
    /// Admitted connections by id
    connections: DashMap<String, Arc<Connection>>,

    /// Room name to member connection ids
    room_members: DashMap<String, HashSet<String>>,

    /// Rooms with a membership change in flight
    room_locks: DashMap<String, RoomLock>,

    adapter: Option<Arc<dyn Adapter>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(adapter: Option<Arc<dyn Adapter>>) -> Self {
        Self {
            connections: DashMap::new(),
            room_members: DashMap::new(),
            room_locks: DashMap::new(),
            adapter,
        }
    }

    #[must_use]
    pub fn new_shared(adapter: Option<Arc<dyn Adapter>>) -> Arc<Self> {
        Arc::new(Self::new(adapter))
    }

    pub fn adapter(&self) -> Option<&Arc<dyn Adapter>> {
        self.adapter.as_ref()
    }

    /// Make a connection visible to routing and fan-out
    pub fn add(&self, connection: Arc<Connection>) {
        tracing::debug!(connection_id = %connection.id(), "Connection added");
        self.connections
            .insert(connection.id().to_string(), connection);
    }

    /// Remove a connection from routing. Room membership is left to [`Self::leave_all`].
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(connection_id).map(|(_, c)| c);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection removed");
        }
        removed
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|r| r.clone())
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.room_members.len()
    }

    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Local members of a room
    pub fn room_members(&self, room: &str) -> Vec<Arc<Connection>> {
        let ids: Vec<String> = self
            .room_members
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();

        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Subscribe primitive. Returns `Ok(false)` when already a member.
    ///
    /// A closed connection is refused, including one that closed while the adapter was
    /// subscribing; its membership is rolled back before returning.
    pub async fn join_room(&self, connection: &Connection, room: &str) -> Result<bool, MembershipError> {
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;
        let joined = self.join_locked(connection, room).await;
        self.release_room_lock(room);
        joined
    }

    /// Unsubscribe primitive. Returns `Ok(false)` when not a member.
    ///
    /// Local membership is dropped even when the adapter fails to unsubscribe.
    pub async fn leave_room(&self, connection: &Connection, room: &str) -> Result<bool, MembershipError> {
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;
        let left = self.leave_locked(connection, room).await;
        self.release_room_lock(room);
        left
    }

    async fn join_locked(&self, connection: &Connection, room: &str) -> Result<bool, MembershipError> {
        if !connection.is_alive() {
            return Err(MembershipError::Closed(connection.id().to_string()));
        }
        if connection.is_member(room) {
            return Ok(false);
        }

        let first_local = self
            .room_members
            .get(room)
            .is_none_or(|members| members.is_empty());

        if first_local {
            if let Some(adapter) = &self.adapter {
                adapter.subscribe(room).await?;
            }
        }

        connection.insert_room(room);
        self.room_members
            .entry(room.to_string())
            .or_default()
            .insert(connection.id().to_string());

        // A disconnect sweeping rooms before the insert above would have missed this one
        if !connection.is_alive() {
            if let Err(e) = self.leave_locked(connection, room).await {
                tracing::warn!(
                    connection_id = %connection.id(),
                    room = %room,
                    error = %e,
                    "Could not roll back join of closed connection"
                );
            }
            return Err(MembershipError::Closed(connection.id().to_string()));
        }

        tracing::trace!(connection_id = %connection.id(), room = %room, "Joined room");
        Ok(true)
    }

    async fn leave_locked(&self, connection: &Connection, room: &str) -> Result<bool, MembershipError> {
        if !connection.remove_room(room) {
            return Ok(false);
        }

        let mut now_empty = false;
        self.room_members.alter(room, |_, mut members| {
            members.remove(connection.id());
            now_empty = members.is_empty();
            members
        });
        if now_empty {
            self.room_members.remove_if(room, |_, members| members.is_empty());
        }

        tracing::trace!(connection_id = %connection.id(), room = %room, "Left room");

        if now_empty {
            if let Some(adapter) = &self.adapter {
                adapter.unsubscribe(room).await?;
            }
        }

        Ok(true)
    }

    fn room_lock(&self, room: &str) -> RoomLock {
        self.room_locks.entry(room.to_string()).or_default().clone()
    }

    /// Forget an empty room's lock once only the caller's handle remains
    fn release_room_lock(&self, room: &str) {
        self.room_locks.remove_if(room, |_, lock| {
            Arc::strong_count(lock) == 2 && !self.room_members.contains_key(room)
        });
    }

    /// Leave every joined room, logging failures. Used at disconnect.
    pub async fn leave_all(&self, connection: &Connection) {
        for room in connection.rooms() {
            if let Err(e) = self.leave_room(connection, &room).await {
                tracing::warn!(
                    connection_id = %connection.id(),
                    room = %room,
                    error = %e,
                    "Could not leave room on disconnect"
                );
            }
        }
    }

    /// Send to one local connection. Returns whether the frame was queued.
    pub async fn send_to(&self, connection_id: &str, frame: ServerFrame) -> bool {
        match self.get(connection_id) {
            Some(conn) if conn.is_alive() => conn.send(frame).await.is_ok(),
            _ => false,
        }
    }

    /// Send to every local member of a room
    pub async fn send_to_room(&self, room: &str, frame: ServerFrame) -> usize {
        let mut sent = 0;

        for conn in self.room_members(room) {
            if conn.is_alive() && conn.send(frame.clone()).await.is_ok() {
                sent += 1;
            }
        }

        tracing::trace!(room = %room, sent = sent, "Frame sent to room");
        sent
    }

    /// Send to every local connection
    pub async fn broadcast(&self, frame: ServerFrame) -> usize {
        let mut sent = 0;

        for conn in self.all() {
            if conn.is_alive() && conn.send(frame.clone()).await.is_ok() {
                sent += 1;
            }
        }

        tracing::trace!(sent = sent, "Frame broadcast to all connections");
        sent
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .field("rooms", &self.room_members.len())
            .field("adapter", &self.adapter.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Recipient;
    use async_trait::async_trait;
    use axum::http::HeaderMap;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    #[derive(Default)]
    struct RecordingAdapter {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Adapter for RecordingAdapter {
        fn name(&self) -> &str {
            "recording"
        }

        async fn subscribe(&self, room: &str) -> Result<(), AdapterError> {
            self.calls.lock().push(format!("sub {room}"));
            Ok(())
        }

        async fn unsubscribe(&self, room: &str) -> Result<(), AdapterError> {
            self.calls.lock().push(format!("unsub {room}"));
            Ok(())
        }

        async fn publish(&self, _: &Recipient, _: &str, _: &Value) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    /// Tracks the subscribed set; unsubscribe parks until `release`
    #[derive(Default)]
    struct GatedAdapter {
        subscribed: Mutex<HashSet<String>>,
        unsubscribing: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Adapter for GatedAdapter {
        fn name(&self) -> &str {
            "gated"
        }

        async fn subscribe(&self, room: &str) -> Result<(), AdapterError> {
            self.subscribed.lock().insert(room.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, room: &str) -> Result<(), AdapterError> {
            self.unsubscribing.notify_one();
            self.release.notified().await;
            self.subscribed.lock().remove(room);
            Ok(())
        }

        async fn publish(&self, _: &Recipient, _: &str, _: &Value) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn connection(id: &str) -> (Arc<Connection>, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(10);
        (Connection::new(id, HeaderMap::new(), None, tx), rx)
    }

    #[tokio::test]
    async fn test_add_remove_connection() {
        let manager = ConnectionManager::new(None);
        let (conn, _rx) = connection("c1");

        manager.add(conn);
        assert_eq!(manager.count(), 1);
        assert!(manager.contains("c1"));

        assert!(manager.remove("c1").is_some());
        assert!(manager.remove("c1").is_none());
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_room_index() {
        let manager = ConnectionManager::new(None);
        let (c1, _rx1) = connection("c1");
        let (c2, _rx2) = connection("c2");
        manager.add(c1.clone());
        manager.add(c2.clone());

        assert!(manager.join_room(&c1, "lobby").await.unwrap());
        assert!(!manager.join_room(&c1, "lobby").await.unwrap());
        assert!(manager.join_room(&c2, "lobby").await.unwrap());
        assert_eq!(manager.room_members("lobby").len(), 2);

        assert!(manager.leave_room(&c1, "lobby").await.unwrap());
        assert!(!manager.leave_room(&c1, "lobby").await.unwrap());
        assert_eq!(manager.room_members("lobby").len(), 1);

        manager.leave_all(&c2).await;
        assert_eq!(manager.room_count(), 0);
        assert_eq!(c2.room_count(), 0);
    }

    #[tokio::test]
    async fn test_adapter_follows_first_and_last_member() {
        let adapter = Arc::new(RecordingAdapter::default());
        let manager = ConnectionManager::new(Some(adapter.clone()));
        let (c1, _rx1) = connection("c1");
        let (c2, _rx2) = connection("c2");

        manager.join_room(&c1, "lobby").await.unwrap();
        manager.join_room(&c2, "lobby").await.unwrap();
        manager.leave_room(&c1, "lobby").await.unwrap();
        manager.leave_room(&c2, "lobby").await.unwrap();

        assert_eq!(*adapter.calls.lock(), vec!["sub lobby", "unsub lobby"]);
    }

    #[tokio::test]
    async fn test_send_to_room_skips_dead() {
        let manager = ConnectionManager::new(None);
        let (c1, mut rx1) = connection("c1");
        let (c2, mut rx2) = connection("c2");
        manager.add(c1.clone());
        manager.add(c2.clone());
        manager.join_room(&c1, "lobby").await.unwrap();
        manager.join_room(&c2, "lobby").await.unwrap();

        c2.mark_dead();
        let sent = manager
            .send_to_room("lobby", ServerFrame::event("action", json!({"type": "ping"})))
            .await;

        assert_eq!(sent, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_waits_for_pending_unsubscribe() {
        let adapter = Arc::new(GatedAdapter::default());
        let manager = ConnectionManager::new_shared(Some(adapter.clone()));
        let (c1, _rx1) = connection("c1");
        let (c2, _rx2) = connection("c2");

        manager.join_room(&c1, "lobby").await.unwrap();

        let leave = {
            let manager = manager.clone();
            let c1 = c1.clone();
            tokio::spawn(async move { manager.leave_room(&c1, "lobby").await })
        };
        adapter.unsubscribing.notified().await;

        let join = {
            let manager = manager.clone();
            let c2 = c2.clone();
            tokio::spawn(async move { manager.join_room(&c2, "lobby").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!join.is_finished());

        adapter.release.notify_one();
        assert!(leave.await.unwrap().unwrap());
        assert!(join.await.unwrap().unwrap());

        assert!(c2.is_member("lobby"));
        assert_eq!(manager.room_members.get("lobby").map(|m| m.len()), Some(1));
        assert!(adapter.subscribed.lock().contains("lobby"));
    }

    #[tokio::test]
    async fn test_closed_connection_cannot_join() {
        let manager = ConnectionManager::new(None);
        let (conn, _rx) = connection("c1");
        conn.mark_dead();

        assert!(matches!(
            manager.join_room(&conn, "lobby").await,
            Err(MembershipError::Closed(id)) if id == "c1"
        ));
        assert!(!conn.is_member("lobby"));
        assert_eq!(manager.room_count(), 0);
    }

    #[tokio::test]
    async fn test_room_locks_are_released() {
        let manager = ConnectionManager::new(None);
        let (conn, _rx) = connection("c1");

        manager.join_room(&conn, "lobby").await.unwrap();
        manager.leave_room(&conn, "lobby").await.unwrap();
        assert!(manager.room_locks.is_empty());
    }
}
