//! wsmux Transport Layer
//!
//! One persistent websocket per UI client carries many RPC links. This
//! crate handles:
//! - Upgrade checks (stable id, auth) and connection lifecycle
//! - The read loop: keepalive, command decoding, forwarding to the link
//! - The write loop: batching data messages, flushing control messages
//! - The link registry mapping stable ids to their live link
//! - Panic containment for connection tasks and per-command work
//!
//! Routing, auth and event fan-out are reached through the traits in
//! [`contracts`].

pub mod batcher;
pub mod bufferpool;
pub mod client;
pub mod config;
mod connection;
pub mod contracts;
pub mod error;
pub mod proxy;
pub mod read_loop;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod write_loop;

pub use axum::http::{HeaderMap, HeaderValue};
pub use batcher::{BatchState, Batcher, Flushed};
pub use bufferpool::BufferPool;
pub use client::{ClientConnection, ConnPhase};
pub use config::{ReadLoopConfig, TransportConfig, WriteLoopConfig};
pub use contracts::{AllowAll, AuthValidator, EventBus, IncomingRequest, LinkRouter, NoEventBus};
pub use error::{AuthError, SetupError, TransportError};
pub use proxy::{ProxyEndpoint, RpcInput, RpcProxy};
pub use registry::{LinkRegistry, StableConnInfo};
pub use server::{TransportDeps, TransportServer};
