//! Relay dispatcher
//!
//! Receives packets other router instances published through the adapter and delivers
//! them to the matching local connections.

use super::Fanout;
use crate::adapter::{Adapter, InboundPacket};
use crate::protocol::ServerFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Background loop feeding adapter packets into local fan-out
pub struct RelayDispatcher {
    adapter: Arc<dyn Adapter>,
    fanout: Fanout,
    running: Arc<AtomicBool>,
}

impl RelayDispatcher {
    pub fn new(adapter: Arc<dyn Adapter>, fanout: Fanout) -> Self {
        Self {
            adapter,
            fanout,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start relaying.
    ///
    /// Does nothing when the adapter has no inbound stream.
    pub fn start(self: Arc<Self>) {
        let Some(receiver) = self.adapter.inbound() else {
            tracing::debug!(adapter = %self.adapter.name(), "Adapter has no inbound stream");
            return;
        };

        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Relay dispatcher is already running");
            return;
        }

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.run(receiver).await;
        });

        tracing::info!(adapter = %self.adapter.name(), "Relay dispatcher started");
    }

    /// Stop after the packet in flight
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Relay dispatcher stopped");
    }

    async fn run(&self, mut receiver: broadcast::Receiver<InboundPacket>) {
        while self.running.load(Ordering::SeqCst) {
            match receiver.recv().await {
                Ok(packet) => self.handle_packet(packet).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "Relay dispatcher lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::warn!("Relay channel closed");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Relay dispatcher loop ended");
    }

    async fn handle_packet(&self, packet: InboundPacket) {
        let sent = self
            .fanout
            .deliver_local(&packet.recipient, ServerFrame::event(packet.event.clone(), packet.data))
            .await;

        tracing::trace!(
            recipient = %packet.recipient,
            event = %packet.event,
            sent = sent,
            "Relayed event"
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RelayDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDispatcher")
            .field("adapter", &self.adapter.name())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
