/*!
 * Dispatch Client
 *
 * One client per logical connection to the engine. Submissions take the
 * admission lock shared; `close` takes it exclusively to flip the client
 * into the destroyed state, so no submission is mid-flight past that point.
 *
 * ## Close protocol
 *
 * 1. Enqueue the engine's shutdown query unless the drain loop already stopped
 * 2. Mark the client destroyed; later submissions get a synthetic error
 * 3. Wait for the drain loop to observe the terminal update and exit
 * 4. Drain once more without waiting, then fail every call still pending
 * 5. Release the engine client and decrement the live-client count
 */

use super::handlers::{ExceptionHandler, ResultHandler};
use super::registry::{HandlerRegistry, PendingCall};
use super::{client_closed, client_opened, drain};
use crate::core::config::ClientConfig;
use crate::core::errors::{ClientError, ClientResult};
use crate::core::id::{IdGenerator, QueryIdGenerator};
use crate::core::types::{ClientInfo, EngineClientId, QueryId};
use crate::engine::{Engine, Query, Response};
use crate::monitoring::span_operation;
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Admission state guarded by the admission lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Open,
    Destroyed,
}

/// Progress of the close protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    Pending,
    /// `close` ran on the drain thread; the loop finishes teardown on exit
    Deferred,
    Done,
}

pub(crate) type Call<E> = PendingCall<<E as Engine>::Query, <E as Engine>::Response>;

/// State shared between the client handle and its drain thread
pub(crate) struct Shared<E: Engine> {
    pub(crate) engine: Arc<E>,
    pub(crate) engine_client_id: EngineClientId,
    pub(crate) config: ClientConfig,
    pub(crate) is_debug: bool,
    ids: QueryIdGenerator,
    pub(crate) registry: HandlerRegistry<E::Query, E::Response>,
    admission: RwLock<Admission>,
    /// Terminal update observed; the drain loop stops after its current batch
    pub(crate) stop: AtomicBool,
    /// Drain loop has returned
    pub(crate) exited: AtomicBool,
    pub(crate) teardown: ReentrantMutex<Cell<Teardown>>,
    pub(crate) default_exception_handler: ArcSwapOption<ExceptionHandler>,
    pub(crate) drain_thread_id: OnceLock<ThreadId>,
    drain_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Engine> Shared<E> {
    pub(crate) fn info(&self) -> ClientInfo {
        ClientInfo {
            engine_client_id: self.engine_client_id,
            is_debug: self.is_debug,
            pending: self.registry.pending_count(),
        }
    }

    pub(crate) fn closed_error(&self) -> E::Response {
        E::Response::error(
            self.config.closed_error_code,
            &self.config.closed_error_message,
        )
    }

    fn is_destroyed(&self) -> bool {
        *self.admission.read() == Admission::Destroyed
    }

    fn on_drain_thread(&self) -> bool {
        self.drain_thread_id.get() == Some(&thread::current().id())
    }

    /// Submit under the shared admission lock
    ///
    /// The closed-client error is delivered after the lock is released, so
    /// its handler may call `close` itself.
    fn send(
        &self,
        query: Arc<E::Query>,
        on_result: Option<ResultHandler<E::Response>>,
        on_exception: Option<ExceptionHandler>,
    ) {
        let admission = self.admission.read();
        if *admission == Admission::Open {
            self.dispatch(query, on_result, on_exception);
            return;
        }
        drop(admission);

        if on_result.is_some() {
            let call = PendingCall::one_shot(query, on_result, on_exception);
            self.deliver(&call, self.closed_error());
        }
    }

    /// Register and forward a query; the caller holds the admission lock
    fn dispatch(
        &self,
        query: Arc<E::Query>,
        on_result: Option<ResultHandler<E::Response>>,
        on_exception: Option<ExceptionHandler>,
    ) -> QueryId {
        let id: QueryId = self.ids.next();
        self.registry.insert(
            id,
            PendingCall::one_shot(Arc::clone(&query), on_result, on_exception),
        );
        self.engine.send(self.engine_client_id, id, &query);
        id
    }

    /// Run the close protocol; only the first completed run has an effect
    fn close(&self) {
        let teardown = if self.on_drain_thread() {
            // Another closer holds the lock while joining this thread
            match self.teardown.try_lock() {
                Some(teardown) => teardown,
                None => return,
            }
        } else {
            self.teardown.lock()
        };
        if teardown.get() == Teardown::Done {
            return;
        }
        let _span = span_operation("close").slow_after_ms(5_000);

        {
            let mut admission = self.admission.write();
            if *admission == Admission::Open {
                if !self.stop.load(Ordering::Acquire) {
                    let id = self.dispatch(Arc::new(E::Query::close_request()), None, None);
                    debug!(client = %self.engine_client_id, id = %id, "Shutdown query sent");
                }
                *admission = Admission::Destroyed;
            }
        }

        if self.on_drain_thread() {
            debug!(client = %self.engine_client_id, "Close on drain thread, teardown deferred");
            teardown.set(Teardown::Deferred);
            return;
        }

        self.join_drain_thread();
        teardown.set(Teardown::Done);
        self.finish_teardown();
    }

    /// Complete a deferred close when the drain loop exits
    ///
    /// Skips when another thread holds the teardown lock: that closer is
    /// joining this thread and completes the teardown itself.
    pub(crate) fn finish_deferred_teardown(&self) {
        let Some(teardown) = self.teardown.try_lock() else {
            return;
        };
        if teardown.get() == Teardown::Deferred {
            teardown.set(Teardown::Done);
            // Detach: a thread cannot join itself
            drop(self.drain_thread.lock().take());
            self.finish_teardown();
        }
    }

    fn join_drain_thread(&self) {
        let handle = self.drain_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(client = %self.engine_client_id, "Drain thread panicked");
            }
        }
    }

    /// Resolve everything still pending and release the engine client
    fn finish_teardown(&self) {
        if self.registry.pending_count() > 0 {
            self.receive_batch(&mut Vec::new(), Duration::ZERO);

            let closed = self.registry.pending_ids();
            debug!(
                client = %self.engine_client_id,
                count = closed.len(),
                "Failing calls pending at close"
            );
            for id in closed {
                self.process_result(id, self.closed_error());
            }
        }

        self.engine.destroy_client(self.engine_client_id);
        client_closed();
        info!(client = %self.engine_client_id, "Client closed");
    }
}

/// Handle to one engine client
///
/// Dropping the handle closes the client.
pub struct Client<E: Engine> {
    shared: Arc<Shared<E>>,
}

impl<E: Engine> Client<E> {
    /// Start building a client on the given engine
    pub fn builder(engine: Arc<E>) -> ClientBuilder<E> {
        ClientBuilder::new(engine)
    }

    /// Create a client with the given handlers
    pub fn create(
        engine: Arc<E>,
        updates_handler: Option<ResultHandler<E::Response>>,
        updates_exception_handler: Option<ExceptionHandler>,
        default_exception_handler: Option<ExceptionHandler>,
        is_debug: bool,
    ) -> ClientResult<Self> {
        let mut builder = Self::builder(engine).debug(is_debug);
        builder.updates_handler = updates_handler;
        builder.updates_exception_handler = updates_exception_handler;
        builder.default_exception_handler = default_exception_handler;
        builder.build()
    }

    /// Send a query to the engine
    ///
    /// `on_result` is called exactly once with the result, or with the
    /// closed-client error if the client is or becomes closed first. When it
    /// is `None` the result is discarded. A panic in `on_result` goes to
    /// `on_exception`, else to the default exception handler, else is dropped.
    ///
    /// Fails only for a `None` query, before touching any state.
    pub fn send(
        &self,
        query: Option<E::Query>,
        on_result: Option<ResultHandler<E::Response>>,
        on_exception: Option<ExceptionHandler>,
    ) -> ClientResult<()> {
        let query = query.ok_or_else(ClientError::null_query)?;
        self.shared.send(Arc::new(query), on_result, on_exception);
        Ok(())
    }

    /// Send a query with a result handler and no exception handler
    pub fn send_with(&self, query: E::Query, on_result: ResultHandler<E::Response>) {
        self.shared.send(Arc::new(query), Some(on_result), None);
    }

    /// Send a query and await its result
    pub fn send_async(&self, query: E::Query) -> impl Future<Output = E::Response> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        self.shared.send(
            Arc::new(query),
            Some(Arc::new(move |response: E::Response| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(response);
                }
            })),
            None,
        );

        let code = self.shared.config.closed_error_code;
        let message = self.shared.config.closed_error_message.clone();
        async move {
            rx.await
                .unwrap_or_else(|_| E::Response::error(code, &message))
        }
    }

    /// Execute a query synchronously, bypassing the client pipeline
    ///
    /// Only queries documented as synchronous may be executed this way.
    pub fn execute(engine: &E, query: Option<&E::Query>) -> ClientResult<E::Response> {
        let query = query.ok_or_else(ClientError::null_query)?;
        Ok(engine.execute(query))
    }

    /// Replace the updates subscriber
    pub fn set_updates_handler(
        &self,
        updates_handler: Option<ResultHandler<E::Response>>,
        on_exception: Option<ExceptionHandler>,
    ) {
        self.shared
            .registry
            .install_updates_handler(updates_handler, on_exception);
    }

    /// Replace the handler used for panics without a per-call handler;
    /// `None` drops such panics
    pub fn set_default_exception_handler(&self, handler: Option<ExceptionHandler>) {
        self.shared
            .default_exception_handler
            .store(handler.map(Arc::new));
    }

    /// Send the same query `count` times, for throughput measurements
    pub fn bench(
        &self,
        query: Option<E::Query>,
        handler: Option<ResultHandler<E::Response>>,
        count: usize,
    ) -> ClientResult<()> {
        let query = Arc::new(query.ok_or_else(ClientError::null_query)?);
        for _ in 0..count {
            self.shared.send(Arc::clone(&query), handler.clone(), None);
        }
        Ok(())
    }

    /// Close the client
    ///
    /// Blocks until the engine has shut the client down and every pending
    /// call has been resolved. Safe to call repeatedly and from any thread;
    /// on the drain thread itself the teardown completes when the loop exits.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_destroyed()
    }

    pub fn is_debug(&self) -> bool {
        self.shared.is_debug
    }

    pub fn engine_client_id(&self) -> EngineClientId {
        self.shared.engine_client_id
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.shared.engine
    }

    /// Calls waiting for a result, updates subscriber excluded
    pub fn pending_count(&self) -> usize {
        self.shared.registry.pending_count()
    }

    /// Id of the drain thread once it has started
    pub fn drain_thread_id(&self) -> Option<ThreadId> {
        self.shared.drain_thread_id.get().copied()
    }

    /// Whether the drain loop has exited
    pub fn is_drain_stopped(&self) -> bool {
        self.shared.exited.load(Ordering::Acquire)
    }

    pub fn info(&self) -> ClientInfo {
        self.shared.info()
    }
}

impl<E: Engine> Drop for Client<E> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Builder for [`Client`]
pub struct ClientBuilder<E: Engine> {
    engine: Arc<E>,
    updates_handler: Option<ResultHandler<E::Response>>,
    updates_exception_handler: Option<ExceptionHandler>,
    default_exception_handler: Option<ExceptionHandler>,
    is_debug: bool,
    config: ClientConfig,
}

impl<E: Engine> ClientBuilder<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            updates_handler: None,
            updates_exception_handler: None,
            default_exception_handler: None,
            is_debug: false,
            config: ClientConfig::default(),
        }
    }

    pub fn updates_handler(mut self, handler: ResultHandler<E::Response>) -> Self {
        self.updates_handler = Some(handler);
        self
    }

    pub fn updates_exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.updates_exception_handler = Some(handler);
        self
    }

    pub fn default_exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.default_exception_handler = Some(handler);
        self
    }

    pub fn debug(mut self, is_debug: bool) -> Self {
        self.is_debug = is_debug;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Allocate the engine client and start the drain thread
    pub fn build(self) -> ClientResult<Client<E>> {
        self.config.validate()?;

        client_opened();
        let engine_client_id = self.engine.create_client();
        let thread_name = self.config.thread_name.clone();

        let shared = Arc::new(Shared {
            engine: self.engine,
            engine_client_id,
            config: self.config,
            is_debug: self.is_debug,
            ids: QueryIdGenerator::default_start(),
            registry: HandlerRegistry::new(),
            admission: RwLock::new(Admission::Open),
            stop: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            teardown: ReentrantMutex::new(Cell::new(Teardown::Pending)),
            default_exception_handler: ArcSwapOption::new(
                self.default_exception_handler.map(Arc::new),
            ),
            drain_thread_id: OnceLock::new(),
            drain_thread: Mutex::new(None),
        });
        shared
            .registry
            .install_updates_handler(self.updates_handler, self.updates_exception_handler);

        let worker = Arc::clone(&shared);
        let handle = match thread::Builder::new()
            .name(thread_name)
            .spawn(move || drain::run(worker))
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(client = %engine_client_id, error = %e, "Failed to start drain thread");
                shared.engine.destroy_client(engine_client_id);
                client_closed();
                return Err(e.into());
            }
        };
        *shared.drain_thread.lock() = Some(handle);

        info!(
            client = %engine_client_id,
            debug = shared.is_debug,
            "Client created"
        );
        Ok(Client { shared })
    }
}
