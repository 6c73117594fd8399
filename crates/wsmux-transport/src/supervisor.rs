//! Panic containment for connection tasks and per-command processing.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, error};
use wsmux_protocol::CommandError;

use crate::error::TransportError;

/// How a supervised task ended.
#[derive(Debug)]
pub enum TaskExit {
    Completed,
    Failed(TransportError),
    Panicked(String),
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `fut`, turning a panic into `Err(message)`.
pub async fn catch_panic<F: Future>(fut: F) -> Result<F::Output, String> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(&*payload))
}

/// Run a synchronous step, turning a panic into `Err(message)`.
pub fn catch_panic_sync<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

/// Run a connection task to completion, logging how it ended. Never
/// unwinds past this boundary.
pub async fn supervise<F>(task: &'static str, fut: F) -> TaskExit
where
    F: Future<Output = Result<(), TransportError>>,
{
    match catch_panic(fut).await {
        Ok(Ok(())) => {
            debug!(task, "task finished");
            TaskExit::Completed
        }
        Ok(Err(e)) => {
            debug!(task, error = %e, "task stopped");
            TaskExit::Failed(e)
        }
        Err(message) => {
            error!(task, panic = %message, "task panicked");
            TaskExit::Panicked(message)
        }
    }
}

/// Run one synchronous command step; a panic becomes
/// [`CommandError::Panic`] tagged with `context`.
pub fn contain<T>(context: &str, f: impl FnOnce() -> Result<T, CommandError>) -> Result<T, CommandError> {
    match catch_panic_sync(f) {
        Ok(result) => result,
        Err(message) => {
            error!(context, panic = %message, "panic while processing command");
            Err(CommandError::Panic {
                context: context.to_string(),
                message,
            })
        }
    }
}
