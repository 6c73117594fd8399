//! Lifecycle of one upgraded websocket.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::WebSocket;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info};
use wsmux_protocol::OutboundMessage;

use crate::client::{ClientConnection, ConnPhase};
use crate::error::TransportError;
use crate::proxy::{ProxyEndpoint, RpcProxy};
use crate::read_loop::read_loop;
use crate::server::AppState;
use crate::supervisor::{catch_panic_sync, supervise};
use crate::write_loop::write_loop;

/// Serve one websocket from registration through teardown.
///
/// Spawns the router forwarder, read loop and write loop, waits for both
/// loops, then unregisters. Teardown runs no matter how the tasks ended.
/// The connection stops when the server's `shutdown` token is cancelled.
pub(crate) async fn handle_ws_connection(socket: WebSocket, stable_id: String, state: Arc<AppState>) {
    let mut client = ClientConnection::new(stable_id);
    let conn_id = client.conn_id.clone();
    info!(conn_id = %conn_id, stable_id = %client.stable_id, "new connection");

    let config = &state.config;
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(config.channel_size);
    let (proxy, endpoint) = RpcProxy::pair(format!("ws:{}", client.stable_id), config.channel_size);

    let registered = catch_panic_sync(|| {
        state
            .event_bus
            .register_ws_channel(&conn_id, &client.stable_id, outbound_tx.clone());
        state.registry.register(&conn_id, &client.stable_id, proxy)
    });
    let link_id = match registered {
        Ok(link_id) => link_id,
        Err(message) => {
            error!(conn_id = %conn_id, panic = %message, "panic while registering connection");
            state.event_bus.unregister_ws_channel(&conn_id);
            return;
        }
    };
    state.client_count.fetch_add(1, Ordering::Relaxed);
    client.advance(ConnPhase::Registered);

    let done = state.shutdown.child_token();
    let (ws_tx, ws_rx) = socket.split();
    let ProxyEndpoint { from_remote, to_remote } = endpoint;

    let forwarder = tokio::spawn(
        supervise("router-forwarder", forward_routed(to_remote, outbound_tx.clone(), done.clone()))
            .in_current_span(),
    );
    let reader = tokio::spawn(
        supervise(
            "read-loop",
            read_loop(ws_rx, outbound_tx, from_remote, done.clone(), config.read_loop()),
        )
        .in_current_span(),
    );
    let writer = tokio::spawn(
        supervise(
            "write-loop",
            write_loop(ws_tx, outbound_rx, done.clone(), config.write_loop(), state.pool.clone()),
        )
        .in_current_span(),
    );
    client.advance(ConnPhase::Serving);

    let (read_exit, write_exit) = tokio::join!(reader, writer);
    client.advance(ConnPhase::Closing);
    done.cancel();
    let _ = forwarder.await;
    debug!(conn_id = %conn_id, ?read_exit, ?write_exit, "connection loops finished");

    state.registry.unregister(&conn_id, &client.stable_id);
    state.event_bus.unregister_ws_channel(&conn_id);
    client.advance(ConnPhase::Closed);

    let remaining = state.client_count.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(
        conn_id = %conn_id,
        %link_id,
        uptime_ms = client.connected_at.elapsed().as_millis() as u64,
        remaining,
        "connection closed"
    );
}

/// Move router replies onto the outbound queue as routed events.
async fn forward_routed(
    mut to_remote: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<OutboundMessage>,
    done: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let bytes = tokio::select! {
            _ = done.cancelled() => break,
            msg = to_remote.recv() => match msg {
                Some(bytes) => bytes,
                None => break,
            },
        };
        let sent = tokio::select! {
            _ = done.cancelled() => break,
            sent = outbound.send(OutboundMessage::Rpc(bytes)) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    to_remote.close();
    Ok(())
}
