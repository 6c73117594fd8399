//! Outbound side of a connection: queue drain, batching, keepalive.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wsmux_protocol::{ControlMessage, MessageClass, OutboundMessage};

use crate::batcher::{Batcher, Flushed};
use crate::bufferpool::BufferPool;
use crate::config::WriteLoopConfig;
use crate::error::TransportError;

/// Drain `outbound` onto `sink` until `done` is cancelled, the queue
/// closes, or a write fails.
///
/// Data messages are coalesced for `batch_window`; control messages flush
/// whatever is pending and then go out alone. Cancels `done` on exit.
pub async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    done: CancellationToken,
    config: WriteLoopConfig,
    pool: Arc<BufferPool>,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let _stop_reader = done.clone().drop_guard();
    let mut batcher = Batcher::new(config.batch_window);
    let mut ping = keepalive(config.initial_ping_interval);
    let mut initial_ping = true;
    let timeout = config.write_timeout;

    let result = loop {
        let flush_at = batcher.deadline();
        let step = tokio::select! {
            biased;
            _ = done.cancelled() => break Ok(()),
            _ = flush_deadline(flush_at) => flush(&mut sink, &mut batcher, &pool, timeout).await,
            _ = ping.tick() => {
                if initial_ping {
                    initial_ping = false;
                    ping = keepalive(config.ping_interval);
                }
                send_control(&mut sink, &mut batcher, &pool, ControlMessage::ping_now(), timeout).await
            }
            msg = outbound.recv() => match msg {
                Some(msg) => enqueue(&mut sink, &mut batcher, &pool, msg, timeout).await,
                None => break Ok(()),
            },
        };
        if let Err(e) = step {
            break Err(e);
        }
    };

    if !batcher.is_empty() {
        debug!(pending = batcher.len(), "dropping unsent batch on shutdown");
    }
    let _ = tokio::time::timeout(timeout, sink.close()).await;
    result
}

fn keepalive(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn flush_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn enqueue<S>(
    sink: &mut S,
    batcher: &mut Batcher,
    pool: &BufferPool,
    msg: OutboundMessage,
    timeout: Duration,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let bytes = match msg.into_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "cannot serialize websocket message, dropping");
            return Ok(());
        }
    };
    match MessageClass::of(&bytes) {
        MessageClass::Control => {
            flush(sink, batcher, pool, timeout).await?;
            send_text(sink, bytes, timeout).await
        }
        MessageClass::Data => {
            batcher.push(bytes, Instant::now());
            Ok(())
        }
    }
}

async fn send_control<S>(
    sink: &mut S,
    batcher: &mut Batcher,
    pool: &BufferPool,
    msg: ControlMessage,
    timeout: Duration,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    enqueue(sink, batcher, pool, msg.into(), timeout).await
}

async fn flush<S>(
    sink: &mut S,
    batcher: &mut Batcher,
    pool: &BufferPool,
    timeout: Duration,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match batcher.take(pool) {
        None => Ok(()),
        Some(Flushed::Single(bytes)) => send_text(sink, bytes, timeout).await,
        Some(Flushed::Batch(frame)) => {
            let sent = send_frame(sink, Message::Binary(frame.clone()), timeout).await;
            pool.reclaim(frame);
            sent
        }
    }
}

async fn send_text<S>(sink: &mut S, bytes: Bytes, timeout: Duration) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => send_frame(sink, Message::Text(text.into()), timeout).await,
        Err(_) => {
            warn!(len = bytes.len(), "outbound message is not UTF-8, dropping");
            Ok(())
        }
    }
}

async fn send_frame<S>(sink: &mut S, msg: Message, timeout: Duration) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(timeout, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::Write(e.to_string())),
        Err(_) => Err(TransportError::WriteTimeout(timeout)),
    }
}
