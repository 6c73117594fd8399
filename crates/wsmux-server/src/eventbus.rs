//! Websocket event bus: pushes server events onto connections' outbound
//! queues.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use wsmux_protocol::{OutboundMessage, WsEvent};
use wsmux_transport::EventBus;

struct WsChannel {
    stable_id: String,
    outbound: mpsc::Sender<OutboundMessage>,
}

/// Connection id → outbound queue. Publishing never blocks: a full queue
/// drops the event for that connection.
#[derive(Default)]
pub struct WsEventBus {
    channels: DashMap<String, WsChannel>,
}

impl WsEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver `event` to every connection registered under `stable_id`.
    /// Returns how many queues accepted it.
    pub fn send_to_stable(&self, stable_id: &str, event: &WsEvent) -> usize {
        self.channels
            .iter()
            .filter(|entry| entry.stable_id == stable_id)
            .filter(|entry| deliver(entry.key(), &entry.outbound, event))
            .count()
    }

    /// Deliver `event` to every connection. Returns how many queues
    /// accepted it.
    pub fn broadcast(&self, event: &WsEvent) -> usize {
        self.channels
            .iter()
            .filter(|entry| deliver(entry.key(), &entry.outbound, event))
            .count()
    }
}

fn deliver(conn_id: &str, outbound: &mpsc::Sender<OutboundMessage>, event: &WsEvent) -> bool {
    match outbound.try_send(OutboundMessage::Event(event.clone())) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(conn_id, eventtype = %event.eventtype, "outbound queue full, dropping event");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(conn_id, "outbound queue closed, dropping event");
            false
        }
    }
}

impl EventBus for WsEventBus {
    fn register_ws_channel(&self, conn_id: &str, stable_id: &str, outbound: mpsc::Sender<OutboundMessage>) {
        self.channels.insert(
            conn_id.to_string(),
            WsChannel {
                stable_id: stable_id.to_string(),
                outbound,
            },
        );
        debug!(conn_id, stable_id, "event channel registered");
    }

    fn unregister_ws_channel(&self, conn_id: &str) {
        if self.channels.remove(conn_id).is_some() {
            debug!(conn_id, "event channel unregistered");
        }
    }
}
