//! wsmux protocol types.
//!
//! Everything that crosses the websocket lives here: the inbound command
//! union, outbound control and event messages, the RPC message carried
//! inside link traffic, and the binary batch envelope. The crate does no
//! I/O; the transport crate owns sockets and channels.

pub mod command;
pub mod error;
pub mod frame;
pub mod message;
pub mod rpc;

pub use command::{Inbound, RpcCommand, WsCommand};
pub use error::{CommandError, ProtocolError};
pub use frame::{decode_batch, encode_batch, encode_batch_into, encoded_len};
pub use message::{
    ControlMessage, MessageClass, OutboundMessage, WsEvent, server_time_millis,
};
pub use rpc::{LinkId, RpcMessage};
