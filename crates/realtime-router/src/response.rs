//! Response formatting
//!
//! Writes the `[ENDED <id>]` timing line for a finished request and sends the reply
//! through the acknowledgement it arrived with. Replies to dead connections are dropped
//! without error.

use crate::dispatch::Request;
use crate::error::{ErrorResponse, RouterError, RouterResult};
use crate::protocol::ServerFrame;
use serde_json::Value;

/// Formats and delivers request outcomes
#[derive(Debug, Clone, Copy)]
pub struct ResponseFormatter {
    /// Global debug toggle for timing lines
    debug: bool,
}

impl ResponseFormatter {
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Log the outcome of a request
    pub fn log(&self, request: &Request, outcome: &RouterResult<Value>) {
        let server_error = matches!(outcome, Err(e) if e.is_server_error());
        if !(self.debug && request.is_debug()) && !server_error {
            return;
        }

        let id = request.id();
        let action = request.action_name();
        let alias = request
            .alias
            .as_deref()
            .map(|a| format!(" ({a})"))
            .unwrap_or_default();
        let elapsed_ms = request.stamp.elapsed_ms();

        match outcome {
            Ok(_) => {
                tracing::trace!(
                    request_id = id,
                    elapsed_ms = %elapsed_ms,
                    "[ENDED {id}] - {action}{alias} = 200 ({elapsed_ms}ms)"
                );
            }
            Err(e) if e.is_server_error() => {
                tracing::warn!(
                    request_id = id,
                    elapsed_ms = %elapsed_ms,
                    error = %e,
                    "[ENDED {id}] {action}{alias} = {} ({elapsed_ms}ms)",
                    e.status_code()
                );
            }
            Err(e @ RouterError::NotFound(name)) => {
                tracing::trace!(
                    request_id = id,
                    elapsed_ms = %elapsed_ms,
                    "[ENDED {id}] {name}{alias} = 404 {e} ({elapsed_ms}ms)"
                );
            }
            Err(e) => {
                tracing::trace!(
                    request_id = id,
                    elapsed_ms = %elapsed_ms,
                    "[ENDED {id}] {action}{alias} = {} [{}] {e} ({elapsed_ms}ms)",
                    e.status_code(),
                    e.error_code()
                );
            }
        }
    }

    /// Log the outcome and reply to the client.
    ///
    /// Returns `true` when a reply frame was handed to the connection.
    pub async fn respond(&self, request: Request, outcome: RouterResult<Value>) -> bool {
        self.log(&request, &outcome);

        if !request.connection.is_alive() {
            return false;
        }
        let Some(ack) = request.ack else {
            return false;
        };

        let frame = match &outcome {
            Ok(value) => ServerFrame::ack_ok(ack, value.clone()),
            Err(e) => ServerFrame::ack_err(ack, ErrorResponse::from(e)),
        };

        match request.connection.send(frame).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    request_id = request.id(),
                    connection_id = %request.connection.id(),
                    "Could not deliver reply, socket writer is gone"
                );
                false
            }
        }
    }
}
