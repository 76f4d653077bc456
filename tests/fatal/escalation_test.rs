/*!
 * Fatal Escalation Tests
 *
 * The registered hook parks the escalating thread, so escalation never gets
 * as far as aborting the test process.
 */

use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tdclient::{
    register_fatal_error_hook, result_handler, Client, ClientConfig, ClientInfo, FatalErrorHook,
    JsonObject, JsonQuery, LoopbackEngine, QueryId, Response,
};

const WAIT: Duration = Duration::from_secs(5);

type Escalation = (Option<ClientInfo>, String, bool);

fn parking_hook() -> flume::Receiver<Escalation> {
    let (tx, rx) = flume::unbounded();
    let hook: FatalErrorHook = Arc::new(move |client: Option<&ClientInfo>, message: &str, is_layer_error: bool| {
        let _ = tx.send((client.cloned(), message.to_string(), is_layer_error));
        loop {
            thread::park();
        }
    });
    register_fatal_error_hook(Some(hook));
    rx
}

#[test]
#[serial]
fn test_lost_promise_escalates() {
    let escalations = parking_hook();
    let engine = Arc::new(LoopbackEngine::holding());
    let client = Client::builder(Arc::clone(&engine))
        .config(ClientConfig::responsive())
        .debug(true)
        .build()
        .unwrap();
    let (tx, delivered) = flume::unbounded();

    client
        .send(
            Some(JsonQuery::new("getChat").with("chat_id", 7)),
            Some(result_handler(move |response: JsonObject| {
                let _ = tx.send(response);
            })),
            None,
        )
        .unwrap();
    engine.respond(
        client.engine_client_id(),
        QueryId(1),
        JsonObject::error(0, "Lost promise"),
    );

    let (info, message, is_layer_error) = escalations.recv_timeout(WAIT).expect("no escalation");
    assert!(is_layer_error);
    let info = info.expect("client info missing");
    assert_eq!(info.engine_client_id, client.engine_client_id());
    assert!(info.is_debug);

    assert!(message.starts_with("#0: Lost promise ("), "{message}");
    assert!(message.contains(" (debug)"), "{message}");
    assert!(message.contains("ms): "), "{message}");
    assert!(message.ends_with(r#"{"@type":"getChat","chat_id":7}"#), "{message}");

    // The handler never sees the lost promise
    assert!(delivered.recv_timeout(Duration::from_millis(200)).is_err());

    // The drain thread is parked in the hook; closing would wait forever
    std::mem::forget(client);
    register_fatal_error_hook(None);
}

#[test]
#[serial]
fn test_ordinary_error_is_delivered() {
    let escalations = parking_hook();
    let engine = Arc::new(LoopbackEngine::holding());
    let client = Client::builder(Arc::clone(&engine))
        .config(ClientConfig::responsive())
        .build()
        .unwrap();
    let (tx, delivered) = flume::unbounded();

    client
        .send(
            Some(JsonQuery::new("getChat")),
            Some(result_handler(move |response: JsonObject| {
                let _ = tx.send(response);
            })),
            None,
        )
        .unwrap();
    engine.respond(
        client.engine_client_id(),
        QueryId(1),
        JsonObject::error(400, "Chat not found"),
    );

    let response = delivered.recv_timeout(WAIT).expect("error not delivered");
    assert_eq!(response.as_error(), Some((400, "Chat not found")));
    assert!(escalations.try_recv().is_err());

    client.close();
    register_fatal_error_hook(None);
}

#[test]
#[serial]
fn test_engine_fatal_error_reaches_hook() {
    let escalations = parking_hook();

    thread::spawn(|| {
        tdclient::fatal::on_engine_fatal_error("database or disk is full");
    });

    let (info, message, is_layer_error) = escalations.recv_timeout(WAIT).expect("no escalation");
    assert!(info.is_none());
    assert_eq!(message, "database or disk is full");
    assert!(!is_layer_error);
    register_fatal_error_hook(None);
}

#[test]
#[serial]
fn test_lost_promise_on_updates_subscriber() {
    let escalations = parking_hook();
    let engine = Arc::new(LoopbackEngine::holding());
    let client = Client::builder(Arc::clone(&engine))
        .config(ClientConfig::responsive())
        .updates_handler(result_handler(|_: JsonObject| {}))
        .build()
        .unwrap();

    engine.emit_update(client.engine_client_id(), JsonObject::error(0, "Lost promise"));

    let (info, message, is_layer_error) = escalations.recv_timeout(WAIT).expect("no escalation");
    assert!(is_layer_error);
    assert!(info.is_some());
    assert!(message.starts_with("#0: Lost promise ("), "{message}");
    assert!(message.ends_with("): updatesHandler"), "{message}");
    assert!(!message.contains("ms)"), "{message}");
    assert!(!message.contains("(debug)"), "{message}");

    // The drain thread is parked in the hook; closing would wait forever
    std::mem::forget(client);
    register_fatal_error_hook(None);
}
