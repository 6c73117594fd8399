//! Collaborator contracts the transport consumes.
//!
//! The transport never routes commands, validates credentials or fans out
//! events itself; it calls into these traits. `wsmux-server` provides the
//! in-process implementations.

use std::collections::HashMap;

use axum::http::HeaderMap;
use tokio::sync::mpsc;
use wsmux_protocol::{LinkId, OutboundMessage};

use crate::error::AuthError;
use crate::proxy::RpcProxy;

/// The command router links are registered with.
///
/// Both methods are called while the link registry's lock is held, so
/// implementations must not block or perform I/O.
pub trait LinkRouter: Send + Sync + 'static {
    /// Take ownership of `proxy` and start routing its traffic.
    fn register_trusted_router(&self, proxy: RpcProxy) -> LinkId;

    /// Stop routing a link. Unknown ids are ignored.
    fn unregister_link(&self, link_id: LinkId);
}

/// The parts of an upgrade request an auth validator may inspect.
pub struct IncomingRequest<'a> {
    headers: &'a HeaderMap,
    query: &'a HashMap<String, String>,
}

impl<'a> IncomingRequest<'a> {
    pub fn new(headers: &'a HeaderMap, query: &'a HashMap<String, String>) -> Self {
        Self { headers, query }
    }

    /// Header value by case-insensitive name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query(&self, name: &str) -> Option<&'a str> {
        self.query.get(name).map(String::as_str)
    }
}

pub trait AuthValidator: Send + Sync + 'static {
    fn validate_incoming_request(&self, request: &IncomingRequest<'_>) -> Result<(), AuthError>;
}

/// Receives each connection's outbound queue so events can be pushed to it.
pub trait EventBus: Send + Sync + 'static {
    fn register_ws_channel(&self, conn_id: &str, stable_id: &str, outbound: mpsc::Sender<OutboundMessage>);

    fn unregister_ws_channel(&self, conn_id: &str);
}

/// Accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthValidator for AllowAll {
    fn validate_incoming_request(&self, _request: &IncomingRequest<'_>) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Discards channel registrations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEventBus;

impl EventBus for NoEventBus {
    fn register_ws_channel(&self, _conn_id: &str, _stable_id: &str, _outbound: mpsc::Sender<OutboundMessage>) {}

    fn unregister_ws_channel(&self, _conn_id: &str) {}
}
