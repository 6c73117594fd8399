//! In-process link router.
//!
//! Each registered proxy gets a link id and a pump task. The pump reads RPC
//! messages from the client, dispatches requests to the handler table and
//! writes responses back through the proxy. Requests on one link are
//! answered in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use wsmux_protocol::{LinkId, RpcMessage};
use wsmux_transport::{LinkRouter, RpcInput, RpcProxy};

use crate::handler::{HandlerError, HandlerTable};

/// A live link.
struct LinkRoute {
    name: String,
    cancel: CancellationToken,
}

/// Routes RPC traffic from trusted (websocket) links to command handlers.
pub struct TrustedRouter {
    handlers: Arc<HandlerTable>,
    links: DashMap<LinkId, LinkRoute>,
    next_link: AtomicI32,
}

impl TrustedRouter {
    pub fn new(handlers: HandlerTable) -> Self {
        Self {
            handlers: Arc::new(handlers),
            links: DashMap::new(),
            // 0 is LinkId::NONE
            next_link: AtomicI32::new(1),
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn has_link(&self, link_id: LinkId) -> bool {
        self.links.contains_key(&link_id)
    }

    pub fn link_name(&self, link_id: LinkId) -> Option<String> {
        self.links.get(&link_id).map(|route| route.name.clone())
    }

    fn allocate_link_id(&self) -> LinkId {
        loop {
            let id = self.next_link.fetch_add(1, Ordering::Relaxed);
            if id > 0 {
                return LinkId(id);
            }
            // wrapped past i32::MAX
            let _ = self
                .next_link
                .compare_exchange(id.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
        }
    }
}

impl LinkRouter for TrustedRouter {
    fn register_trusted_router(&self, proxy: RpcProxy) -> LinkId {
        let link_id = self.allocate_link_id();
        let cancel = CancellationToken::new();
        self.links.insert(
            link_id,
            LinkRoute {
                name: proxy.name.clone(),
                cancel: cancel.clone(),
            },
        );
        info!(%link_id, name = %proxy.name, "link registered");

        let span = info_span!("link", %link_id);
        tokio::spawn(pump_link(proxy, self.handlers.clone(), cancel).instrument(span));
        link_id
    }

    fn unregister_link(&self, link_id: LinkId) {
        match self.links.remove(&link_id) {
            Some((_, route)) => {
                route.cancel.cancel();
                info!(%link_id, name = %route.name, "link unregistered");
            }
            None => debug!(%link_id, "unregister for unknown link"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Link pump
// ─────────────────────────────────────────────────────────────────────────────

async fn pump_link(proxy: RpcProxy, handlers: Arc<HandlerTable>, cancel: CancellationToken) {
    let RpcProxy {
        name,
        mut from_remote,
        to_remote,
        ..
    } = proxy;

    loop {
        let input = tokio::select! {
            _ = cancel.cancelled() => break,
            input = from_remote.recv() => match input {
                Some(input) => input,
                None => break,
            },
        };
        let Some(reply) = handle_input(&handlers, input).await else {
            continue;
        };
        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(error = %e, "cannot serialize rpc response");
                continue;
            }
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = to_remote.send(bytes) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    debug!(name = %name, "link pump stopped");
}

/// Dispatch one inbound message. Returns the reply to send, if any.
async fn handle_input(handlers: &HandlerTable, input: RpcInput) -> Option<RpcMessage> {
    let msg: RpcMessage = match serde_json::from_slice(&input.msg_bytes) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "dropping undecodable rpc message");
            return None;
        }
    };
    if msg.cancel {
        debug!(reqid = ?msg.reqid, "cancel request ignored, commands run to completion");
        return None;
    }
    let Some(command) = msg.command_name().map(str::to_string) else {
        debug!(resid = ?msg.resid, "ignoring rpc message without command");
        return None;
    };

    let timeout_ms = msg.timeout.filter(|&ms| ms > 0);
    let dispatch = handlers.dispatch(&command, msg.data);
    let result = match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms as u64), dispatch)
            .await
            .unwrap_or_else(|_| {
                Err(HandlerError::Timeout {
                    command: command.clone(),
                    timeout_ms: ms,
                })
            }),
        None => dispatch.await,
    };

    let Some(reqid) = msg.reqid.filter(|id| !id.is_empty()) else {
        if let Err(e) = result {
            warn!(command = %command, error = %e, "fire-and-forget command failed");
        }
        return None;
    };
    Some(match result {
        Ok(data) => RpcMessage::response(reqid, data),
        Err(e) => {
            debug!(command = %command, error = %e, "command failed");
            RpcMessage::error_response(reqid, e.to_string())
        }
    })
}
