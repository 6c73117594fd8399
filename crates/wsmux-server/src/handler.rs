//! Command handlers the link router dispatches RPC requests to.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use wsmux_transport::supervisor::catch_panic;

/// Result of one command: optional response data, or an error sent back
/// as the RPC `error` field.
pub type CommandResult = Result<Option<Value>, HandlerError>;

#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("invalid data for {command}: {message}")]
    InvalidData { command: String, message: String },

    #[error("{0}")]
    Failed(String),

    #[error("command {command} timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: i64 },

    #[error("panic in command {command}: {message}")]
    Panicked { command: String, message: String },
}

/// Trait implemented by everything that answers RPC commands.
///
/// A handler owns a fixed set of command names; the table routes each
/// command to exactly one handler.
pub trait CommandHandler: Send + Sync {
    fn commands(&self) -> &'static [&'static str];

    fn handle(
        &self,
        command: &str,
        data: Option<Value>,
    ) -> impl Future<Output = CommandResult> + Send;
}

/// Object-safe wrapper for the CommandHandler trait.
trait CommandHandlerDyn: Send + Sync {
    fn handle_dyn<'a>(
        &'a self,
        command: &'a str,
        data: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = CommandResult> + Send + 'a>>;
}

impl<T: CommandHandler> CommandHandlerDyn for T {
    fn handle_dyn<'a>(
        &'a self,
        command: &'a str,
        data: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = CommandResult> + Send + 'a>> {
        Box::pin(self.handle(command, data))
    }
}

/// Command name → handler.
#[derive(Default)]
pub struct HandlerTable {
    handlers: Vec<Box<dyn CommandHandlerDyn>>,
    index: HashMap<&'static str, usize>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every command it names. A later registration
    /// takes over a command from an earlier one.
    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        let slot = self.handlers.len();
        for &command in handler.commands() {
            if self.index.insert(command, slot).is_some() {
                warn!(command, "command handler replaced");
            }
        }
        info!(commands = ?handler.commands(), "registered command handler");
        self.handlers.push(Box::new(handler));
    }

    pub fn with<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn contains(&self, command: &str) -> bool {
        self.index.contains_key(command)
    }

    pub fn commands(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.index.keys().copied()
    }

    /// Run `command`. A panicking handler is contained and reported as
    /// [`HandlerError::Panicked`].
    pub async fn dispatch(&self, command: &str, data: Option<Value>) -> CommandResult {
        let Some(&slot) = self.index.get(command) else {
            return Err(HandlerError::UnknownCommand(command.to_string()));
        };
        let handler = &self.handlers[slot];
        match catch_panic(handler.handle_dyn(command, data)).await {
            Ok(result) => result,
            Err(message) => {
                error!(command, panic = %message, "command handler panicked");
                Err(HandlerError::Panicked {
                    command: command.to_string(),
                    message,
                })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in commands
// ─────────────────────────────────────────────────────────────────────────────

pub const COMMAND_ROUTE_ANNOUNCE: &str = "routeannounce";
pub const COMMAND_ROUTE_UNANNOUNCE: &str = "routeunannounce";
pub const COMMAND_ECHO: &str = "echo";

/// Route bookkeeping acknowledgements plus `echo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreHandler;

impl CommandHandler for CoreHandler {
    fn commands(&self) -> &'static [&'static str] {
        &[COMMAND_ROUTE_ANNOUNCE, COMMAND_ROUTE_UNANNOUNCE, COMMAND_ECHO]
    }

    async fn handle(&self, command: &str, data: Option<Value>) -> CommandResult {
        match command {
            COMMAND_ROUTE_ANNOUNCE | COMMAND_ROUTE_UNANNOUNCE => {
                debug!(command, "route acknowledged");
                Ok(None)
            }
            COMMAND_ECHO => Ok(data),
            other => Err(HandlerError::UnknownCommand(other.to_string())),
        }
    }
}
