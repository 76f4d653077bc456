/*!
 * Callback Types
 * Result and exception handlers registered with submitted queries
 */

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Called with the result of a query, or with every update for the
/// standing subscriber
pub type ResultHandler<R> = Arc<dyn Fn(R) + Send + Sync>;

/// Called when a result handler panics
pub type ExceptionHandler = Arc<dyn Fn(CallbackPanic) + Send + Sync>;

/// Wrap a closure as a [`ResultHandler`]
pub fn result_handler<R, F>(f: F) -> ResultHandler<R>
where
    F: Fn(R) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as an [`ExceptionHandler`]
pub fn exception_handler<F>(f: F) -> ExceptionHandler
where
    F: Fn(CallbackPanic) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A panic caught while running a result handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("result handler panicked: {message}")]
pub struct CallbackPanic {
    pub message: String,
}

impl CallbackPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        Self { message }
    }
}
