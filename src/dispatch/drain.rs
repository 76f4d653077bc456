/*!
 * Drain Loop
 * Dedicated per-client thread pulling result batches from the engine
 */

use super::client::Shared;
use crate::engine::{Engine, Event};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info_span, trace};

/// Thread body: drain until the terminal update has been processed
pub(crate) fn run<E: Engine>(shared: Arc<Shared<E>>) {
    let _ = shared.drain_thread_id.set(thread::current().id());
    let span = info_span!("drain", client = %shared.engine_client_id);
    let _entered = span.enter();

    let mut events = Vec::with_capacity(shared.config.max_events);
    while !shared.stop.load(Ordering::Acquire) {
        shared.receive_batch(&mut events, shared.config.receive_timeout);
    }

    debug!("Stop TDLib thread");
    shared.exited.store(true, Ordering::Release);
    shared.finish_deferred_teardown();
}

impl<E: Engine> Shared<E> {
    /// One receive call, resolving results in the order the engine returned them
    pub(crate) fn receive_batch(&self, events: &mut Vec<Event<E::Response>>, timeout: Duration) {
        events.clear();
        let count = self.engine.receive(
            self.engine_client_id,
            events,
            self.config.max_events,
            timeout,
        );
        if count > 0 {
            trace!(count, "Received batch");
        }

        for event in events.drain(..) {
            self.process_result(event.id, event.response);
        }
    }
}
