//! Inbound side of a connection.

use std::fmt::Display;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wsmux_protocol::{
    CommandError, ControlMessage, Inbound, LinkId, OutboundMessage, RpcCommand, WsCommand,
};

use crate::config::ReadLoopConfig;
use crate::error::TransportError;
use crate::proxy::RpcInput;
use crate::supervisor::contain;

/// Read frames until the peer goes away, the deadline passes, a frame is
/// malformed, or `done` is cancelled.
///
/// Keepalive replies and command errors go to `outbound`; RPC payloads go
/// to `rpc_input`. `done` is cancelled on every exit path, including a
/// panic, so the write loop always stops with us.
pub async fn read_loop<St, E>(
    mut stream: St,
    outbound: mpsc::Sender<OutboundMessage>,
    rpc_input: mpsc::Sender<RpcInput>,
    done: CancellationToken,
    config: ReadLoopConfig,
) -> Result<(), TransportError>
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let _stop_writer = done.clone().drop_guard();
    let mut deadline = Instant::now() + config.read_timeout;

    loop {
        let next = tokio::select! {
            _ = done.cancelled() => return Ok(()),
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };
        let msg = match next {
            Err(_) => return Err(TransportError::ReadTimeout(config.read_timeout)),
            Ok(None) => {
                debug!("websocket stream ended");
                return Ok(());
            }
            Ok(Some(Err(e))) => return Err(TransportError::Read(e.to_string())),
            Ok(Some(Ok(msg))) => msg,
        };

        let payload: Bytes = match msg {
            Message::Text(text) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Message::Binary(bytes) => bytes,
            Message::Close(frame) => {
                debug!(?frame, "peer closed websocket");
                return Ok(());
            }
            // protocol-level ping/pong is answered by the websocket layer
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if payload.len() > config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                limit: config.max_message_size,
            });
        }

        let inbound = Inbound::parse(&payload)?;
        deadline = Instant::now() + config.read_timeout;

        match inbound {
            Inbound::Pong | Inbound::Unrecognized => {}
            Inbound::Ping => {
                if !enqueue(&outbound, &done, ControlMessage::pong_now().into()).await {
                    return Ok(());
                }
            }
            Inbound::Command { wscommand, body } => {
                let context = command_context(&wscommand, &body);
                match contain(&context, || decode_rpc_input(body)) {
                    Ok(Some(input)) => {
                        let sent = tokio::select! {
                            _ = done.cancelled() => return Ok(()),
                            sent = rpc_input.send(input) => sent,
                        };
                        if sent.is_err() {
                            debug!("link router no longer reading, dropping rpc message");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(command = %context, error = %e, "websocket command failed");
                        let reply = ControlMessage::error(format!("{context}: {e}")).into();
                        if !enqueue(&outbound, &done, reply).await {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Decode a command body and re-serialize its RPC payload for the router.
/// An RPC command without a message is a no-op.
pub fn decode_rpc_input(body: serde_json::Value) -> Result<Option<RpcInput>, CommandError> {
    let command = WsCommand::from_value(body)?;
    match command {
        WsCommand::Rpc(RpcCommand { message: None }) => Ok(None),
        WsCommand::Rpc(RpcCommand { message: Some(message) }) => {
            let msg_bytes = serde_json::to_vec(&message).map_err(CommandError::Encode)?;
            Ok(Some(RpcInput {
                msg_bytes: msg_bytes.into(),
                ingress_link_id: LinkId::NONE,
            }))
        }
    }
}

/// Tag for errors raised by a command: `wscommand:<type>`, plus
/// `:<rpc command>` when the raw body names one.
pub fn command_context(wscommand: &str, body: &serde_json::Value) -> String {
    let rpc_command = body
        .get("message")
        .and_then(|m| m.get("command"))
        .and_then(serde_json::Value::as_str)
        .filter(|c| !c.is_empty());
    match rpc_command {
        Some(cmd) => format!("wscommand:{wscommand}:{cmd}"),
        None => format!("wscommand:{wscommand}"),
    }
}

/// Queue a message for the write loop. Returns false once the connection
/// is shutting down.
async fn enqueue(
    outbound: &mpsc::Sender<OutboundMessage>,
    done: &CancellationToken,
    msg: OutboundMessage,
) -> bool {
    tokio::select! {
        _ = done.cancelled() => false,
        sent = outbound.send(msg) => sent.is_ok(),
    }
}
