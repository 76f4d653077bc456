/*!
 * Dispatch Layer
 *
 * Accepts queries from any thread, forwards them to the engine, and routes
 * results delivered on the drain thread back to the originating caller or
 * to the standing updates subscriber.
 *
 * ## Components
 *
 * - [`registry`]: pending calls keyed by correlation id
 * - [`client`]: submit/execute/close API and the admission gate
 * - `drain`: dedicated thread pulling result batches from the engine
 * - `resolve`: result delivery with callback panic isolation
 */

pub mod client;
mod drain;
pub mod handlers;
pub mod registry;
mod resolve;

pub use client::{Client, ClientBuilder};
pub use handlers::{exception_handler, result_handler, CallbackPanic, ExceptionHandler, ResultHandler};
pub use registry::{CallKind, HandlerRegistry, PendingCall};

use std::sync::atomic::{AtomicU64, Ordering};

/// Constructed-and-not-yet-closed clients in this process
static LIVE_CLIENTS: AtomicU64 = AtomicU64::new(0);

/// Number of live clients in this process
pub fn live_client_count() -> u64 {
    LIVE_CLIENTS.load(Ordering::SeqCst)
}

pub(crate) fn client_opened() {
    LIVE_CLIENTS.fetch_add(1, Ordering::SeqCst);
}

pub(crate) fn client_closed() {
    LIVE_CLIENTS.fetch_sub(1, Ordering::SeqCst);
}
