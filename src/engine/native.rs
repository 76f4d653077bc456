/*!
 * Native tdjson Engine
 *
 * Binds the per-client tdjson C interface. Correlation ids travel through
 * the `@extra` field of each request and come back on the matching result;
 * objects without `@extra` are updates and route to id 0.
 *
 * # Safety
 *
 * tdjson allows `send` and `execute` from any thread. `receive` must only be
 * called by one thread per client, which the drain loop guarantees. Strings
 * returned by tdjson stay valid until the next call on the same thread, so
 * they are copied out immediately.
 */

use super::json::{JsonObject, JsonQuery, EXTRA_FIELD};
use super::{Engine, Event, Response};
use crate::core::types::{EngineClientId, QueryId};
use crate::fatal;
use ahash::RandomState;
use dashmap::DashMap;
use std::ffi::{c_char, c_double, c_void, CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::Duration;
use tracing::{error, warn};

#[link(name = "tdjson")]
extern "C" {
    fn td_json_client_create() -> *mut c_void;
    fn td_json_client_send(client: *mut c_void, request: *const c_char);
    fn td_json_client_receive(client: *mut c_void, timeout: c_double) -> *const c_char;
    fn td_json_client_execute(client: *mut c_void, request: *const c_char) -> *const c_char;
    fn td_json_client_destroy(client: *mut c_void);
    fn td_set_log_fatal_error_callback(callback: Option<extern "C" fn(*const c_char)>);
}

static FATAL_CALLBACK: Once = Once::new();

extern "C" fn on_native_fatal_error(message: *const c_char) {
    let message = if message.is_null() {
        String::new()
    } else {
        // SAFETY: tdjson passes a NUL-terminated string valid for this call
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    };
    fatal::on_engine_fatal_error(&message)
}

/// Raw client pointer owned by tdjson
struct RawClient(*mut c_void);

// SAFETY: tdjson clients are thread-safe for send/execute, and receive is
// serialized by the caller
unsafe impl Send for RawClient {}
unsafe impl Sync for RawClient {}

/// Engine backed by the tdjson shared library
pub struct TdJsonEngine {
    clients: DashMap<EngineClientId, RawClient, RandomState>,
    next_id: AtomicU64,
}

impl TdJsonEngine {
    pub fn new() -> Self {
        FATAL_CALLBACK.call_once(|| {
            // SAFETY: the callback is a plain function with a static lifetime
            unsafe { td_set_log_fatal_error_callback(Some(on_native_fatal_error)) };
        });
        Self {
            clients: DashMap::with_hasher(RandomState::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn raw(&self, client: EngineClientId) -> *mut c_void {
        self.clients
            .get(&client)
            .map(|raw| raw.0)
            .unwrap_or(ptr::null_mut())
    }

    fn encode(id: Option<QueryId>, query: &JsonQuery) -> Option<CString> {
        let mut value = query.value().clone();
        if let (Some(id), Some(map)) = (id, value.as_object_mut()) {
            map.insert(EXTRA_FIELD.to_string(), id.0.into());
        }
        match CString::new(value.to_string()) {
            Ok(request) => Some(request),
            Err(e) => {
                error!(error = %e, "Query contains an interior NUL byte");
                None
            }
        }
    }

    fn decode(raw: *const c_char) -> Option<Event<JsonObject>> {
        if raw.is_null() {
            return None;
        }
        // SAFETY: non-null results are NUL-terminated and valid until the next call
        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
        let mut object: JsonObject = match serde_json::from_str(&text) {
            Ok(object) => object,
            Err(e) => {
                error!(error = %e, "Malformed object from tdjson");
                return None;
            }
        };
        let id = object
            .take(EXTRA_FIELD)
            .and_then(|extra| extra.as_u64())
            .map(QueryId)
            .unwrap_or(QueryId::UPDATES);
        Some(Event::new(id, object))
    }
}

impl Default for TdJsonEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for TdJsonEngine {
    type Query = JsonQuery;
    type Response = JsonObject;

    fn create_client(&self) -> EngineClientId {
        // SAFETY: no preconditions
        let raw = unsafe { td_json_client_create() };
        let id = EngineClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.clients.insert(id, RawClient(raw));
        id
    }

    fn destroy_client(&self, client: EngineClientId) {
        if let Some((_, raw)) = self.clients.remove(&client) {
            // SAFETY: pointer came from td_json_client_create and is destroyed once
            unsafe { td_json_client_destroy(raw.0) };
        }
    }

    fn send(&self, client: EngineClientId, id: QueryId, query: &JsonQuery) {
        let raw = self.raw(client);
        if raw.is_null() {
            warn!(client = %client, id = %id, "Send to unknown tdjson client");
            return;
        }
        if let Some(request) = Self::encode(Some(id), query) {
            // SAFETY: raw is a live client and request is NUL-terminated
            unsafe { td_json_client_send(raw, request.as_ptr()) };
        }
    }

    fn receive(
        &self,
        client: EngineClientId,
        events: &mut Vec<Event<JsonObject>>,
        capacity: usize,
        timeout: Duration,
    ) -> usize {
        let raw = self.raw(client);
        if raw.is_null() || capacity == 0 {
            return 0;
        }

        let mut count = 0;
        let mut wait = timeout.as_secs_f64();
        while count < capacity {
            // SAFETY: raw is a live client; receive is serialized by the drain loop
            let result = unsafe { td_json_client_receive(raw, wait) };
            if result.is_null() {
                break;
            }
            if let Some(event) = Self::decode(result) {
                events.push(event);
                count += 1;
            }
            wait = 0.0;
        }
        count
    }

    fn execute(&self, query: &JsonQuery) -> JsonObject {
        let Some(request) = Self::encode(None, query) else {
            return JsonObject::error(400, "Query contains a NUL byte");
        };
        // SAFETY: execute accepts a null client for engine-global requests
        let result = unsafe { td_json_client_execute(ptr::null_mut(), request.as_ptr()) };
        Self::decode(result)
            .map(|event| event.response)
            .unwrap_or_else(|| JsonObject::error(400, "Empty result from tdjson"))
    }
}
