//! Error types for session lookup and connection writes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use framecast_core::errors::KeyError;
use framecast_core::keys::SessionKey;
use thiserror::Error;

/// Session creation and lookup failures.
///
/// Each variant maps to the HTTP status a client sees; none of them ever
/// reaches the WebSocket upgrade.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The randomness source failed while generating a key.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The key was never issued or has been evicted.
    #[error("session not found: {0}")]
    NotFound(SessionKey),

    /// Another connection is already streaming this session.
    #[error("session already streaming: {0}")]
    Busy(SessionKey),

    /// The registry is full.
    #[error("session capacity reached ({0})")]
    CapacityExceeded(usize),

    /// The path segment is not a well-formed key.
    #[error("malformed session key")]
    InvalidKey,
}

impl SessionError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Key(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Busy(_) => StatusCode::CONFLICT,
            Self::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidKey => StatusCode::BAD_REQUEST,
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Key(_) => "key_generation",
            Self::NotFound(_) => "not_found",
            Self::Busy(_) => "busy",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::InvalidKey => "invalid_key",
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        if let Self::Key(ref e) = self {
            tracing::error!(error = %e, "session key generation failed");
        }
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Writing to a streaming connection failed.
///
/// Expected at the end of every session (peer went away); never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink was already closed.
    #[error("connection closed")]
    Closed,

    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(String),
}
