/*!
 * Dispatch Limits and Constants
 *
 * Centralized location for the fixed values of the dispatch layer.
 * Protocol constants shared with the engine are marked with [PROTOCOL].
 */

use std::time::Duration;

// =============================================================================
// DRAIN LOOP
// =============================================================================

/// Maximum events pulled from the engine in one receive call
/// Callers of `Engine::receive` must not assume full batches
pub const MAX_EVENTS: usize = 1000;

/// Receive timeout for the background drain loop (300s)
/// Long enough to avoid busy-spinning, the engine wakes the call on shutdown
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Name of the per-client drain thread
pub const DRAIN_THREAD_NAME: &str = "TDLib thread";

// =============================================================================
// SYNTHETIC RESULTS
// =============================================================================

/// Error code delivered to calls that can no longer reach the engine
pub const CLIENT_CLOSED_CODE: i32 = 500;

/// Error message delivered to calls that can no longer reach the engine
pub const CLIENT_CLOSED_MESSAGE: &str = "Client is closed";

// =============================================================================
// FATAL ERRORS
// =============================================================================

/// [PROTOCOL] Error code of a result whose request was dropped inside the engine
pub const LOST_PROMISE_CODE: i32 = 0;

/// [PROTOCOL] Error message of a result whose request was dropped inside the engine
pub const LOST_PROMISE_MESSAGE: &str = "Lost promise";

/// Name of the thread that raises the unrecoverable condition
pub const FATAL_ERROR_THREAD_NAME: &str = "TDLib fatal error thread";

/// Sleep interval of a thread parked after a fatal error
pub const FATAL_PARK_INTERVAL: Duration = Duration::from_millis(1000);
