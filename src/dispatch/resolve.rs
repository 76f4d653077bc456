/*!
 * Result Resolution
 *
 * Applies a delivered result to the call it belongs to. Handler panics are
 * isolated per call so a misbehaving callback cannot take down the drain
 * thread; a lost promise from the engine escalates to a fatal error.
 */

use super::client::{Call, Shared};
use super::handlers::CallbackPanic;
use super::live_client_count;
use crate::core::limits::{LOST_PROMISE_CODE, LOST_PROMISE_MESSAGE};
use crate::core::types::QueryId;
use crate::engine::{Engine, Query, Response};
use crate::fatal;
use std::any::Any;
use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use tracing::{error, trace, warn};

impl<E: Engine> Shared<E> {
    /// Route one delivered result
    pub(crate) fn process_result(&self, id: QueryId, response: E::Response) {
        if id.is_updates() && response.is_closed_update() {
            self.stop.store(true, Ordering::Release);
        }

        let Some(call) = self.registry.resolve(id) else {
            error!(
                client = %self.engine_client_id,
                "Can't find handler for the result {} -- ignore result",
                id
            );
            return;
        };
        trace!(client = %self.engine_client_id, id = %id, "Resolving result");
        self.deliver(&call, response);
    }

    /// Hand a result to the call's handler, isolating handler panics
    pub(crate) fn deliver(&self, call: &Call<E>, response: E::Response) {
        let Some(on_result) = call.on_result.as_ref() else {
            return;
        };

        if let Some((code, message)) = response.as_error() {
            if code == LOST_PROMISE_CODE && message == LOST_PROMISE_MESSAGE {
                let diagnostic = self.lost_promise_diagnostic(call, code, message);
                fatal::on_fatal_error(Some(&self.info()), &diagnostic, true);
            }
        }

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_result(response))) {
            self.handle_panic(call, payload);
        }
    }

    fn handle_panic(&self, call: &Call<E>, payload: Box<dyn Any + Send>) {
        let cause = CallbackPanic::from_payload(payload);
        warn!(client = %self.engine_client_id, error = %cause, "Result handler panicked");

        let handler = call.on_exception.clone().or_else(|| {
            self.default_exception_handler
                .load_full()
                .map(|handler| (*handler).clone())
        });
        if let Some(handler) = handler {
            // A panicking exception handler is dropped
            let _ = panic::catch_unwind(AssertUnwindSafe(|| handler(cause)));
        }
    }

    /// `#<code>: <message> (<live>)[ (debug)][ (in <ms>ms)]: <query>`
    fn lost_promise_diagnostic(&self, call: &Call<E>, code: i32, message: &str) -> String {
        let mut out = format!("#{}: {} ({})", code, message, live_client_count());
        if self.is_debug {
            out.push_str(" (debug)");
        }
        if let Some(elapsed) = call.elapsed() {
            let _ = write!(out, " (in {}ms)", elapsed.as_millis());
        }
        out.push_str(": ");
        match &call.query {
            Some(query) => out.push_str(&query.describe()),
            None => out.push_str("updatesHandler"),
        }
        out
    }
}
