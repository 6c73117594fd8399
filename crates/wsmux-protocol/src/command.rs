//! Inbound frames from the UI client.
//!
//! Every inbound text frame is a JSON object. Keepalive traffic is
//! identified by `type` (`ping` / `pong`); commands by the `wscommand`
//! discriminator. Anything else is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CommandError, ProtocolError};
use crate::rpc::RpcMessage;

/// Discriminator value of the RPC command variant.
pub const WSCOMMAND_RPC: &str = "rpc";

const KNOWN_COMMANDS: &[&str] = &[WSCOMMAND_RPC];

/// An inbound frame after outer-level classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ping,
    Pong,
    /// A frame carrying a non-empty `wscommand`. The body is decoded
    /// separately so that a bad command costs one error frame, not the
    /// connection.
    Command { wscommand: String, body: Value },
    Unrecognized,
}

impl Inbound {
    /// Parse raw frame bytes. Fails only when the outer frame is not a
    /// JSON object.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::classify(value)
    }

    pub fn classify(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(map) = &value else {
            return Err(ProtocolError::NotAnObject);
        };
        match map.get("type").and_then(Value::as_str) {
            Some("ping") => return Ok(Self::Ping),
            Some("pong") => return Ok(Self::Pong),
            _ => {}
        }
        let wscommand = match map.get("wscommand").and_then(Value::as_str) {
            Some(cmd) if !cmd.is_empty() => cmd.to_string(),
            _ => return Ok(Self::Unrecognized),
        };
        Ok(Self::Command { wscommand, body: value })
    }
}

/// The closed set of websocket commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "wscommand")]
pub enum WsCommand {
    #[serde(rename = "rpc")]
    Rpc(RpcCommand),
}

/// Wraps one RPC message bound for the link router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcCommand {
    #[serde(default)]
    pub message: Option<RpcMessage>,
}

impl WsCommand {
    /// Decode a command body, failing explicitly on a missing or unknown
    /// discriminator.
    pub fn from_value(body: Value) -> Result<Self, CommandError> {
        let command = match body.get("wscommand").and_then(Value::as_str) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => return Err(CommandError::MissingDiscriminator),
        };
        if !KNOWN_COMMANDS.contains(&command.as_str()) {
            return Err(CommandError::UnknownCommand(command));
        }
        serde_json::from_value(body).map_err(|source| CommandError::Decode { command, source })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rpc(_) => WSCOMMAND_RPC,
        }
    }
}
