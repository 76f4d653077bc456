/*!
 * Fatal Error Escalation
 *
 * Entry point for conditions the engine cannot recover from. Escalation
 * never returns: the registered hook is told first, then a dedicated thread
 * raises a typed [`FatalError`] panic (so the host panic hook sees the crash
 * and its class) and aborts the process, while the calling thread is parked.
 */

mod classify;
mod report;

pub use classify::{is_database_broken_error, is_disk_full_error, is_external_error, FatalErrorKind};
pub use report::{source_location, strip_private_data, FatalError, SourceLocation};

use crate::core::limits::{FATAL_ERROR_THREAD_NAME, FATAL_PARK_INTERVAL};
use crate::core::types::ClientInfo;
use crate::dispatch::live_client_count;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::{process, thread};
use tracing::error;

/// Process-wide fatal error hook
///
/// Receives the originating client when known, the message, and whether the
/// error was detected by the dispatch layer (`true`) rather than the engine.
pub type FatalErrorHook = Arc<dyn Fn(Option<&ClientInfo>, &str, bool) + Send + Sync>;

static FATAL_ERROR_HOOK: RwLock<Option<FatalErrorHook>> = parking_lot::const_rwlock(None);

/// Install or clear the process-wide hook, returning the previous one
pub fn register_fatal_error_hook(hook: Option<FatalErrorHook>) -> Option<FatalErrorHook> {
    std::mem::replace(&mut *FATAL_ERROR_HOOK.write(), hook)
}

/// Escalation entry for the engine's own fatal error callback
pub fn on_engine_fatal_error(message: &str) -> ! {
    on_fatal_error(None, message, false)
}

/// Escalate an unrecoverable condition; never returns
pub fn on_fatal_error(client: Option<&ClientInfo>, message: &str, is_layer_error: bool) -> ! {
    error!(
        client = ?client.map(|c| c.engine_client_id),
        is_layer_error,
        "Fatal error: {}",
        message
    );

    let hook = FATAL_ERROR_HOOK.read().clone();
    if let Some(hook) = hook {
        hook(client, message, is_layer_error);
    }

    let report = FatalError::new(message, live_client_count());
    let crash = report.clone();
    if let Err(e) = thread::Builder::new()
        .name(FATAL_ERROR_THREAD_NAME.to_string())
        .spawn(move || raise(crash))
    {
        error!(error = %e, "Failed to spawn fatal error thread");
        raise(report);
    }

    loop {
        thread::sleep(FATAL_PARK_INTERVAL);
    }
}

/// Surface the report to the host panic hook, then abort
fn raise(report: FatalError) -> ! {
    error!(kind = ?report.kind, external = report.is_external(), "{}", report);
    let _ = panic::catch_unwind(AssertUnwindSafe(|| panic::panic_any(report)));
    process::abort()
}
