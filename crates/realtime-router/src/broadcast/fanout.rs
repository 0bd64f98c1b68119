//! Event fan-out
//!
//! Delivers an envelope to local connections and, when an adapter is configured, publishes
//! it for the other router instances. Each recipient is handled independently: a failure
//! for one room is logged and the remaining rooms are still served.

use crate::adapter::{AdapterError, Recipient};
use crate::connection::ConnectionManager;
use crate::events::EventEnvelope;
use crate::protocol::ServerFrame;
use serde_json::Value;
use std::sync::Arc;

/// Fan-out failure for one recipient
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Summary of one envelope delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Frames queued to local connections
    pub delivered: usize,
    /// Recipients that could not be fully served
    pub failed: Vec<Recipient>,
}

/// Fan-out over local connections and the adapter
#[derive(Debug, Clone)]
pub struct Fanout {
    connections: Arc<ConnectionManager>,
}

impl Fanout {
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Deliver an envelope to every recipient it targets
    pub async fn deliver(&self, envelope: &EventEnvelope) -> FanoutReport {
        let data = envelope.encode();
        let mut report = FanoutReport::default();

        for recipient in envelope.recipients() {
            match self.deliver_to(&recipient, envelope.event(), &data).await {
                Ok(sent) => report.delivered += sent,
                Err(e) => {
                    tracing::warn!(
                        event = %envelope.event(),
                        name = %envelope.name(),
                        recipient = %recipient,
                        error = %e,
                        "Could not send event"
                    );
                    report.failed.push(recipient);
                }
            }
        }

        report
    }

    /// Deliver locally, then publish. A connection found locally is not published.
    pub async fn deliver_to(
        &self,
        recipient: &Recipient,
        event: &str,
        data: &Value,
    ) -> Result<usize, FanoutError> {
        let sent = self
            .deliver_local(recipient, ServerFrame::event(event, data.clone()))
            .await;

        if matches!(recipient, Recipient::Connection(_)) && sent > 0 {
            return Ok(sent);
        }

        if let Some(adapter) = self.connections.adapter() {
            adapter.publish(recipient, event, data).await?;
        }

        Ok(sent)
    }

    /// Deliver to local connections only
    pub async fn deliver_local(&self, recipient: &Recipient, frame: ServerFrame) -> usize {
        match recipient {
            Recipient::Connection(id) => usize::from(self.connections.send_to(id, frame).await),
            Recipient::Room(room) => self.connections.send_to_room(room, frame).await,
            Recipient::All => self.connections.broadcast(frame).await,
        }
    }
}
