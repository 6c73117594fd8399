//! Outbound batching state machine.
//!
//! Data messages accumulate while the batcher is `Batching`; the write loop
//! sleeps until [`Batcher::deadline`] and then calls [`Batcher::take`].
//! Control messages never enter the batcher, but force a `take` first so
//! wire order matches enqueue order.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::warn;
use wsmux_protocol::frame;

use crate::bufferpool::BufferPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Batching { deadline: Instant },
}

/// What a flush puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flushed {
    /// A lone message, sent as a plain text frame.
    Single(Bytes),
    /// Two or more messages in the binary envelope.
    Batch(Bytes),
}

pub struct Batcher {
    window: Duration,
    pending: Vec<Bytes>,
    state: BatchState,
}

impl Batcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            BatchState::Idle => None,
            BatchState::Batching { deadline } => Some(deadline),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue a data message. The first message of a window arms the
    /// deadline; later ones never extend it.
    pub fn push(&mut self, msg: Bytes, now: Instant) {
        self.pending.push(msg);
        if self.state == BatchState::Idle {
            self.state = BatchState::Batching {
                deadline: now + self.window,
            };
        }
    }

    /// Drain everything pending and return to `Idle`.
    ///
    /// A batch frame owns the pooled buffer it was encoded into; hand it
    /// back with [`BufferPool::reclaim`] once it has been written.
    pub fn take(&mut self, pool: &BufferPool) -> Option<Flushed> {
        self.state = BatchState::Idle;
        match self.pending.len() {
            0 => None,
            1 => self.pending.pop().map(Flushed::Single),
            count => {
                let mut buf = pool.acquire(frame::encoded_len(&self.pending));
                let encoded = frame::encode_batch_into(&self.pending, &mut buf);
                self.pending.clear();
                match encoded {
                    Ok(()) => Some(Flushed::Batch(Bytes::from(buf))),
                    Err(e) => {
                        warn!(count, error = %e, "dropping batch that does not fit the envelope");
                        pool.release(buf);
                        None
                    }
                }
            }
        }
    }
}
