//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding wire frames.
///
/// Fatal to the connection on the inbound path. On the outbound path they
/// only cost the offending message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("routed payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("truncated batch frame: {0}")]
    TruncatedBatch(&'static str),

    #[error("batch frame has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("batch element of {0} bytes does not fit the envelope")]
    OversizedElement(usize),
}

/// Errors raised while processing a single inbound command.
///
/// These never terminate a connection: the read loop turns them into an
/// `error` control frame prefixed with `wscommand:<type>[:<rpc command>]`
/// and keeps reading.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no wscommand field in command map")]
    MissingDiscriminator,

    #[error("unknown wscommand type {0:?}")]
    UnknownCommand(String),

    #[error("cannot decode wscommand {command:?}: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode rpc message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("panic: {message}")]
    Panic { context: String, message: String },
}
