//! RPC message and link identifiers shared with the command router.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque routing handle assigned by the router when a link is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub i32);

impl LinkId {
    /// Sentinel meaning "no link".
    pub const NONE: LinkId = LinkId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single RPC message as exchanged with the command router.
///
/// Requests carry `command` and usually `reqid`; responses carry `resid`
/// matching the request. All fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resid: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authtoken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// More responses follow for this request (streaming).
    #[serde(default, skip_serializing_if = "is_false")]
    pub cont: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cancel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl RpcMessage {
    pub fn request(command: impl Into<String>, reqid: Option<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            command: Some(command.into()),
            reqid,
            data,
            ..Default::default()
        }
    }

    pub fn response(resid: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            resid: Some(resid.into()),
            data,
            ..Default::default()
        }
    }

    pub fn error_response(resid: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            resid: Some(resid.into()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// The command name, treating an empty string as absent.
    pub fn command_name(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.is_empty())
    }
}
