/*!
 * Loopback Engine
 * In-process engine answering queries through a pluggable responder
 *
 * Each client owns an unbounded flume channel of ready events. `send`
 * pushes the responder's reply onto it, `receive` blocks on it with the
 * requested timeout. A `close` query is acknowledged and followed by the
 * `authorizationStateClosing` and `authorizationStateClosed` updates.
 */

use super::json::{JsonObject, JsonQuery};
use super::{Engine, Event, Response};
use crate::core::id::{EngineClientIdGenerator, IdGenerator};
use crate::core::types::{EngineClientId, QueryId};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the responder wants done with a query
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Deliver this result for the query's id
    Respond(JsonObject),
    /// Keep the query unanswered until [`LoopbackEngine::respond`] is called
    Hold,
}

/// Responder function type
pub type Responder = Arc<dyn Fn(&JsonQuery) -> Reply + Send + Sync>;

struct ClientQueue {
    tx: flume::Sender<Event<JsonObject>>,
    rx: flume::Receiver<Event<JsonObject>>,
    sent: Mutex<Vec<(QueryId, JsonQuery)>>,
    held: Mutex<Vec<QueryId>>,
    closed: AtomicBool,
}

impl ClientQueue {
    fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, id: QueryId, response: JsonObject) {
        // The receiver lives as long as the queue, so send cannot fail
        let _ = self.tx.send(Event::new(id, response));
    }
}

/// In-process engine
pub struct LoopbackEngine {
    clients: DashMap<EngineClientId, Arc<ClientQueue>, RandomState>,
    ids: EngineClientIdGenerator,
    responder: Responder,
    destroyed: AtomicU64,
}

impl LoopbackEngine {
    /// Create an engine answering every query with the responder's reply
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&JsonQuery) -> Reply + Send + Sync + 'static,
    {
        Self {
            clients: DashMap::with_hasher(RandomState::new()),
            ids: EngineClientIdGenerator::default_start(),
            responder: Arc::new(responder),
            destroyed: AtomicU64::new(0),
        }
    }

    /// Engine answering each query with a copy of itself
    pub fn echo() -> Self {
        Self::new(|query| Reply::Respond(JsonObject::from_value(query.value().clone())))
    }

    /// Engine that never answers queries on its own
    pub fn holding() -> Self {
        Self::new(|_| Reply::Hold)
    }

    fn queue(&self, client: EngineClientId) -> Option<Arc<ClientQueue>> {
        self.clients.get(&client).map(|q| Arc::clone(&q))
    }

    /// Deliver a result for an id, answered or not
    pub fn respond(&self, client: EngineClientId, id: QueryId, response: JsonObject) {
        match self.queue(client) {
            Some(queue) => {
                queue.held.lock().retain(|held| *held != id);
                queue.push(id, response);
            }
            None => warn!(client = %client, id = %id, "Respond to unknown loopback client"),
        }
    }

    /// Deliver an unsolicited update
    pub fn emit_update(&self, client: EngineClientId, update: JsonObject) {
        self.respond(client, QueryId::UPDATES, update);
    }

    /// Queries received for a client, in submission order
    pub fn sent(&self, client: EngineClientId) -> Vec<(QueryId, JsonQuery)> {
        self.queue(client)
            .map(|q| q.sent.lock().clone())
            .unwrap_or_default()
    }

    /// Ids held without an answer
    pub fn held(&self, client: EngineClientId) -> Vec<QueryId> {
        self.queue(client)
            .map(|q| q.held.lock().clone())
            .unwrap_or_default()
    }

    /// Number of clients still allocated
    pub fn live_clients(&self) -> usize {
        self.clients.len()
    }

    /// Number of clients destroyed so far
    pub fn destroyed_clients(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::echo()
    }
}

impl Engine for LoopbackEngine {
    type Query = JsonQuery;
    type Response = JsonObject;

    fn create_client(&self) -> EngineClientId {
        let client = self.ids.next();
        self.clients.insert(client, Arc::new(ClientQueue::new()));
        debug!(client = %client, "Loopback client created");
        client
    }

    fn destroy_client(&self, client: EngineClientId) {
        if self.clients.remove(&client).is_some() {
            self.destroyed.fetch_add(1, Ordering::Relaxed);
            debug!(client = %client, "Loopback client destroyed");
        }
    }

    fn send(&self, client: EngineClientId, id: QueryId, query: &JsonQuery) {
        let Some(queue) = self.queue(client) else {
            warn!(client = %client, id = %id, "Send to unknown loopback client");
            return;
        };
        queue.sent.lock().push((id, query.clone()));

        if queue.closed.load(Ordering::Acquire) {
            queue.push(id, JsonObject::error(500, "Request aborted"));
            return;
        }

        if query.type_name() == Some("close") {
            queue.closed.store(true, Ordering::Release);
            queue.push(id, JsonObject::ok());
            queue.push(
                QueryId::UPDATES,
                JsonObject::authorization_state("authorizationStateClosing"),
            );
            queue.push(
                QueryId::UPDATES,
                JsonObject::authorization_state("authorizationStateClosed"),
            );
            return;
        }

        match (self.responder)(query) {
            Reply::Respond(response) => queue.push(id, response),
            Reply::Hold => queue.held.lock().push(id),
        }
    }

    fn receive(
        &self,
        client: EngineClientId,
        events: &mut Vec<Event<JsonObject>>,
        capacity: usize,
        timeout: Duration,
    ) -> usize {
        let Some(queue) = self.queue(client) else {
            return 0;
        };
        if capacity == 0 {
            return 0;
        }

        let first = if timeout.is_zero() {
            queue.rx.try_recv().ok()
        } else {
            queue.rx.recv_timeout(timeout).ok()
        };
        let Some(first) = first else {
            return 0;
        };
        events.push(first);

        let mut count = 1;
        while count < capacity {
            match queue.rx.try_recv() {
                Ok(event) => {
                    events.push(event);
                    count += 1;
                }
                Err(_) => break,
            }
        }
        count
    }

    fn execute(&self, query: &JsonQuery) -> JsonObject {
        match (self.responder)(query) {
            Reply::Respond(response) => response,
            Reply::Hold => JsonObject::error(400, "The method can't be executed synchronously"),
        }
    }
}
