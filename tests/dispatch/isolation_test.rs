/*!
 * Callback Isolation Tests
 * A panicking result handler must not disturb the drain loop
 */

use crate::support::{client, collector, WAIT};
use serial_test::parallel;
use std::sync::Arc;
use std::time::Duration;
use tdclient::{
    exception_handler, result_handler, CallbackPanic, Client, ClientConfig, ExceptionHandler,
    JsonObject, JsonQuery, LoopbackEngine, ResultHandler,
};

fn panicking_handler(message: &'static str) -> ResultHandler<JsonObject> {
    result_handler(move |_: JsonObject| panic!("{}", message))
}

fn recording_exception_handler() -> (ExceptionHandler, flume::Receiver<CallbackPanic>) {
    let (tx, rx) = flume::unbounded();
    let handler = exception_handler(move |cause| {
        let _ = tx.send(cause);
    });
    (handler, rx)
}

#[test]
#[parallel]
fn test_panic_goes_to_per_call_handler() {
    let engine = Arc::new(LoopbackEngine::echo());
    let (default_handler, defaults) = recording_exception_handler();
    let client = Client::builder(engine)
        .config(ClientConfig::responsive())
        .default_exception_handler(default_handler)
        .build()
        .unwrap();
    let (on_exception, causes) = recording_exception_handler();

    client
        .send(
            Some(JsonQuery::new("getMe")),
            Some(panicking_handler("boom")),
            Some(on_exception),
        )
        .unwrap();

    let cause = causes.recv_timeout(WAIT).expect("exception handler not called");
    assert!(cause.message.contains("boom"), "unexpected cause: {cause}");
    assert!(causes.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(defaults.try_recv().is_err());

    // The drain loop survived
    let (handler, results) = collector();
    client.send_with(JsonQuery::new("getOption"), handler);
    assert!(results.recv_timeout(WAIT).is_ok());
}

#[test]
#[parallel]
fn test_panic_falls_back_to_default_handler() {
    let engine = Arc::new(LoopbackEngine::echo());
    let client = client(&engine);
    let (default_handler, defaults) = recording_exception_handler();
    client.set_default_exception_handler(Some(default_handler));

    client
        .send(Some(JsonQuery::new("getMe")), Some(panicking_handler("fallback")), None)
        .unwrap();

    let cause = defaults.recv_timeout(WAIT).expect("default handler not called");
    assert_eq!(cause.message, "fallback");
    assert!(defaults.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
#[parallel]
fn test_unhandled_panic_is_dropped() {
    let engine = Arc::new(LoopbackEngine::echo());
    let client = client(&engine);
    client.set_default_exception_handler(None);

    for _ in 0..3 {
        client
            .send(Some(JsonQuery::new("getMe")), Some(panicking_handler("ignored")), None)
            .unwrap();
    }

    let (handler, results) = collector();
    client.send_with(JsonQuery::new("getOption"), handler);
    let result = results.recv_timeout(WAIT).expect("drain loop stopped");
    assert_eq!(result.type_name(), Some("getOption"));
}

#[test]
#[parallel]
fn test_panicking_exception_handler_is_swallowed() {
    let engine = Arc::new(LoopbackEngine::echo());
    let client = client(&engine);

    client
        .send(
            Some(JsonQuery::new("getMe")),
            Some(panicking_handler("first")),
            Some(exception_handler(|_| panic!("second"))),
        )
        .unwrap();

    let (handler, results) = collector();
    client.send_with(JsonQuery::new("getOption"), handler);
    assert!(results.recv_timeout(WAIT).is_ok());
    assert!(!client.is_drain_stopped());
}

#[test]
#[parallel]
fn test_updates_handler_panic_keeps_subscription() {
    let engine = Arc::new(LoopbackEngine::echo());
    let (on_exception, causes) = recording_exception_handler();
    let client = Client::builder(Arc::clone(&engine))
        .config(ClientConfig::responsive())
        .updates_handler(panicking_handler("update"))
        .updates_exception_handler(on_exception)
        .build()
        .unwrap();

    let id = client.engine_client_id();
    engine.emit_update(id, JsonObject::new("updateOption"));
    engine.emit_update(id, JsonObject::new("updateOption"));

    assert!(causes.recv_timeout(WAIT).is_ok());
    assert!(causes.recv_timeout(WAIT).is_ok());
}
