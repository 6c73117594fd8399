//! Outbound messages: what the write loop drains and puts on the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ProtocolError;

/// Event type used when wrapping router-originated bytes.
pub const EVENT_TYPE_RPC: &str = "rpc";

/// Milliseconds since the unix epoch, as sent in `stime`.
pub fn server_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Keepalive and error traffic. Always sent as its own text frame, never
/// batched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Ping { stime: i64 },
    Pong { stime: i64 },
    Error { error: String },
}

impl ControlMessage {
    pub fn ping_now() -> Self {
        Self::Ping { stime: server_time_millis() }
    }

    pub fn pong_now() -> Self {
        Self::Pong { stime: server_time_millis() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }
}

/// An event pushed to the client outside of any RPC exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEvent {
    pub eventtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oref: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WsEvent {
    pub fn new(eventtype: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            eventtype: eventtype.into(),
            oref: None,
            data,
        }
    }

    pub fn with_oref(mut self, oref: impl Into<String>) -> Self {
        self.oref = Some(oref.into());
        self
    }
}

#[derive(Serialize)]
struct RoutedEvent<'a> {
    eventtype: &'static str,
    data: &'a RawValue,
}

/// An item on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Control(ControlMessage),
    Event(WsEvent),
    /// Bytes produced by the link router, wrapped as
    /// `{"eventtype":"rpc","data":<bytes>}` on serialization.
    Rpc(Bytes),
    /// Already-serialized JSON, sent as-is.
    Raw(Bytes),
}

impl OutboundMessage {
    pub fn into_bytes(self) -> Result<Bytes, ProtocolError> {
        match self {
            Self::Raw(bytes) => Ok(bytes),
            Self::Control(msg) => Ok(serde_json::to_vec(&msg)?.into()),
            Self::Event(event) => Ok(serde_json::to_vec(&event)?.into()),
            Self::Rpc(raw) => {
                let text = std::str::from_utf8(&raw).map_err(|_| ProtocolError::InvalidUtf8)?;
                let data: &RawValue = serde_json::from_str(text)?;
                let envelope = RoutedEvent {
                    eventtype: EVENT_TYPE_RPC,
                    data,
                };
                Ok(serde_json::to_vec(&envelope)?.into())
            }
        }
    }
}

impl From<ControlMessage> for OutboundMessage {
    fn from(msg: ControlMessage) -> Self {
        Self::Control(msg)
    }
}

impl From<WsEvent> for OutboundMessage {
    fn from(event: WsEvent) -> Self {
        Self::Event(event)
    }
}

/// Whether a serialized message must bypass batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Control,
    Data,
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type", default)]
    msg_type: Option<String>,
}

impl MessageClass {
    /// Classify serialized bytes by their top-level `type` field only.
    pub fn of(bytes: &[u8]) -> Self {
        let msg_type = serde_json::from_slice::<TypeProbe>(bytes)
            .ok()
            .and_then(|probe| probe.msg_type);
        match msg_type.as_deref() {
            Some("ping" | "pong" | "error") => Self::Control,
            _ => Self::Data,
        }
    }
}
