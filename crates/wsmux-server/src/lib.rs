//! wsmux Server Components
//!
//! In-process implementations of the collaborators the transport calls
//! into: the link router and its command handlers, the websocket event
//! bus, and auth-key validation.

pub mod auth;
pub mod eventbus;
pub mod handler;
pub mod router;

pub use auth::AuthKeyValidator;
pub use eventbus::WsEventBus;
pub use handler::{CommandHandler, CommandResult, CoreHandler, HandlerError, HandlerTable};
pub use router::TrustedRouter;
