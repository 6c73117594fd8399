//! Transport error types.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use wsmux_protocol::ProtocolError;

/// Errors that end a read or write loop (and with it the connection).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no frame received within {0:?}")]
    ReadTimeout(Duration),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("websocket read error: {0}")]
    Read(String),

    #[error("websocket write error: {0}")]
    Write(String),

    #[error("inbound message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Auth validator failure. The message is returned to the HTTP client.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AuthError(pub String);

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Reasons an upgrade request is refused before the protocol switch.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("stableid is required")]
    MissingStableId,

    #[error("error validating authkey: {0}")]
    Auth(#[from] AuthError),
}

impl SetupError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingStableId => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for SetupError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
