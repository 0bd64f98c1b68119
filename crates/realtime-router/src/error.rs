//! Router error types
//!
//! Every failure a client can observe maps to one `RouterError`, which carries the
//! status and dotted error code sent back in the acknowledgement.

use crate::dispatch::ActionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Broad classification of router failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    NotFound,
    Unavailable,
    InvalidName,
    RoomPrimitive,
    /// Failure reported by the action handler itself
    Action,
    Internal,
}

/// Router error type
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Authorization is required")]
    AuthMissing,

    #[error("Authorization rejected: {0}")]
    AuthInvalid(String),

    #[error("The requested action does not exist: {0}")]
    NotFound(String),

    #[error("The requested action is temporarily disabled: {0}")]
    Disabled(String),

    #[error("Room operations are not available: {0}")]
    RoomUnavailable(String),

    #[error("Please provide a valid room name")]
    InvalidRoomName,

    #[error("Could not update membership of room {room}: {reason}")]
    RoomPrimitive { room: String, reason: String },

    #[error("Could not leave rooms: {}", .failed.join(", "))]
    RoomClear { failed: Vec<String> },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("An internal error occurred: {0}")]
    Internal(String),
}

impl RouterError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthMissing | Self::AuthInvalid(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Disabled(_) | Self::RoomUnavailable(_) => ErrorKind::Unavailable,
            Self::InvalidRoomName => ErrorKind::InvalidName,
            Self::RoomPrimitive { .. } | Self::RoomClear { .. } => ErrorKind::RoomPrimitive,
            Self::Action(_) => ErrorKind::Action,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Status code reported to the client
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRoomName => 400,
            Self::AuthMissing | Self::RoomUnavailable(_) => 401,
            Self::AuthInvalid(_) => 403,
            Self::NotFound(_) => 404,
            Self::Disabled(_) => 502,
            Self::RoomPrimitive { .. } | Self::RoomClear { .. } | Self::Internal(_) => 500,
            Self::Action(e) => e.status,
        }
    }

    /// Error code for acknowledgements and handshake rejections
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::AuthMissing => "TRANSPORT.AUTH_REQUIRED",
            Self::AuthInvalid(_) => "TRANSPORT.AUTH_FAILED",
            Self::NotFound(_) => "TRANSPORT.NOT_FOUND",
            Self::Disabled(_) => "TRANSPORT.UNAVAILABLE",
            Self::RoomUnavailable(_) => "ROOM.UNAVAILABLE",
            Self::InvalidRoomName => "ROOM.NAME",
            Self::RoomPrimitive { .. } => "ROOM.FAILED",
            Self::RoomClear { .. } => "ROOM.CLEAR",
            Self::Action(e) => &e.code,
            Self::Internal(_) => "TRANSPORT.ERROR",
        }
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    pub fn internal(reason: impl std::fmt::Display) -> Self {
        Self::Internal(reason.to_string())
    }
}

/// Error body sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<&RouterError> for ErrorResponse {
    fn from(err: &RouterError) -> Self {
        let data = match err {
            RouterError::Action(action) => action.data.clone(),
            RouterError::RoomClear { failed } => Some(serde_json::json!({ "rooms": failed })),
            _ => None,
        };

        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
            status: err.status_code(),
            data,
        }
    }
}

/// Handshake rejections are answered over plain HTTP
impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = ?self, "Server error occurred");
        }

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Result type alias for router operations
pub type RouterResult<T> = Result<T, RouterError>;
