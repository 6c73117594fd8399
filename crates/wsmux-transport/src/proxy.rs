//! RPC proxy: the channel pair between one connection and the link router.

use bytes::Bytes;
use tokio::sync::mpsc;
use wsmux_protocol::LinkId;

/// One serialized RPC message travelling from the client toward the router.
#[derive(Debug, Clone)]
pub struct RpcInput {
    pub msg_bytes: Bytes,
    pub ingress_link_id: LinkId,
}

/// Router-side half. Handed to [`LinkRouter::register_trusted_router`],
/// which owns it for the lifetime of the link.
///
/// [`LinkRouter::register_trusted_router`]: crate::contracts::LinkRouter::register_trusted_router
#[derive(Debug)]
pub struct RpcProxy {
    pub name: String,
    pub capacity: usize,
    /// Messages from the client.
    pub from_remote: mpsc::Receiver<RpcInput>,
    /// Messages for the client.
    pub to_remote: mpsc::Sender<Bytes>,
}

/// Connection-side half. Dropping `from_remote` closes the inbound channel;
/// the forwarder closes `to_remote` when it stops. Each happens once,
/// through ownership.
#[derive(Debug)]
pub struct ProxyEndpoint {
    pub from_remote: mpsc::Sender<RpcInput>,
    pub to_remote: mpsc::Receiver<Bytes>,
}

impl RpcProxy {
    /// Build both halves with bounded channels of `capacity`.
    pub fn pair(name: impl Into<String>, capacity: usize) -> (RpcProxy, ProxyEndpoint) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let proxy = RpcProxy {
            name: name.into(),
            capacity,
            from_remote: in_rx,
            to_remote: out_tx,
        };
        let endpoint = ProxyEndpoint {
            from_remote: in_tx,
            to_remote: out_rx,
        };
        (proxy, endpoint)
    }
}
