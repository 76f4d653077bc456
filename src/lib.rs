/*!
 * TDLib Client Dispatch
 *
 * Concurrent request/response dispatch in front of an asynchronous engine:
 * callers on any thread submit queries with callbacks, a per-client drain
 * thread pulls result batches and routes each result back by correlation id.
 */

pub mod core;
pub mod dispatch;
pub mod engine;
pub mod fatal;
pub mod monitoring;

// Re-exports
pub use crate::core::{ClientConfig, ClientError, ClientInfo, ClientResult, EngineClientId, QueryId};
pub use dispatch::{
    exception_handler, live_client_count, result_handler, CallbackPanic, Client, ClientBuilder,
    ExceptionHandler, ResultHandler,
};
pub use engine::{Engine, Event, JsonObject, JsonQuery, LoopbackEngine, Query, Reply, Response};
pub use fatal::{register_fatal_error_hook, FatalError, FatalErrorHook, FatalErrorKind};
pub use monitoring::init_tracing;
