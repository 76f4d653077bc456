/*!
 * Engine Collaborator
 *
 * The asynchronous execution engine the dispatch layer sits in front of.
 * The dispatch layer only relies on create/destroy, fire-and-forget send,
 * batched receive with a bounded wait, and a synchronous execute escape hatch.
 *
 * ## Implementations
 *
 * - [`loopback::LoopbackEngine`]: in-process engine for tools and tests
 * - `native::TdJsonEngine`: tdjson over FFI (feature `native`)
 */

pub mod json;
pub mod loopback;
#[cfg(feature = "native")]
pub mod native;

use crate::core::types::{EngineClientId, QueryId};
use std::fmt;
use std::time::Duration;

pub use json::{JsonObject, JsonQuery};
pub use loopback::{LoopbackEngine, Reply};

/// A request understood by the engine
pub trait Query: fmt::Debug + Send + Sync + 'static {
    /// The distinguished query asking the engine to shut the client down
    fn close_request() -> Self;

    /// Single-line human-readable form used in fatal diagnostics
    fn describe(&self) -> String {
        format!("{:?}", self).replace('\n', "\\n")
    }
}

/// A result or unsolicited update emitted by the engine
pub trait Response: Send + 'static {
    /// Build an error value
    fn error(code: i32, message: &str) -> Self;

    /// `(code, message)` when this value is an error
    fn as_error(&self) -> Option<(i32, &str)>;

    /// True for the authorization-state transition into the terminal closed state
    fn is_closed_update(&self) -> bool;
}

/// One `(correlation id, result)` pair delivered by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Event<R> {
    pub id: QueryId,
    pub response: R,
}

impl<R> Event<R> {
    pub fn new(id: QueryId, response: R) -> Self {
        Self { id, response }
    }
}

/// Engine contract consumed by the dispatch layer
///
/// `send` and `execute` may be called from any thread. `receive` is only
/// called by one thread at a time per client.
pub trait Engine: Send + Sync + 'static {
    type Query: Query;
    type Response: Response;

    /// Allocate engine-side state for a new client
    fn create_client(&self) -> EngineClientId;

    /// Release engine-side state of a client
    fn destroy_client(&self, client: EngineClientId);

    /// Fire-and-forget submission; failures surface only through fatal escalation
    fn send(&self, client: EngineClientId, id: QueryId, query: &Self::Query);

    /// Append up to `capacity` ready events to `events`, waiting at most
    /// `timeout` for the first one; returns the number appended
    fn receive(
        &self,
        client: EngineClientId,
        events: &mut Vec<Event<Self::Response>>,
        capacity: usize,
        timeout: Duration,
    ) -> usize;

    /// Synchronously execute a query that is documented as safe to run
    /// outside the asynchronous pipeline
    fn execute(&self, query: &Self::Query) -> Self::Response;
}
