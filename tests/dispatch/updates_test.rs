/*!
 * Updates Subscriber Tests
 */

use crate::support::{client, collector, WAIT};
use pretty_assertions::assert_eq;
use serial_test::parallel;
use std::sync::Arc;
use std::time::Duration;
use tdclient::{Client, ClientConfig, JsonObject, LoopbackEngine, Response};

#[test]
#[parallel]
fn test_updates_reach_standing_subscriber() {
    let engine = Arc::new(LoopbackEngine::echo());
    let (updates, received) = collector();
    let client = Client::builder(Arc::clone(&engine))
        .config(ClientConfig::responsive())
        .updates_handler(updates)
        .build()
        .unwrap();

    let id = client.engine_client_id();
    for name in ["updateOption", "updateUser", "updateOption"] {
        engine.emit_update(id, JsonObject::new(name));
    }

    let names: Vec<String> = (0..3)
        .map(|_| {
            let update = received.recv_timeout(WAIT).expect("update not delivered");
            update.type_name().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(names, vec!["updateOption", "updateUser", "updateOption"]);
    assert_eq!(client.pending_count(), 0);
}

#[test]
#[parallel]
fn test_replaced_updates_handler_takes_over() {
    let engine = Arc::new(LoopbackEngine::echo());
    let client = client(&engine);
    let (first, first_received) = collector();
    let (second, second_received) = collector();

    client.set_updates_handler(Some(first), None);
    engine.emit_update(client.engine_client_id(), JsonObject::new("updateOption"));
    assert!(first_received.recv_timeout(WAIT).is_ok());

    client.set_updates_handler(Some(second), None);
    engine.emit_update(client.engine_client_id(), JsonObject::new("updateOption"));
    assert!(second_received.recv_timeout(WAIT).is_ok());
    assert!(first_received.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
#[parallel]
fn test_close_delivers_terminal_updates() {
    let engine = Arc::new(LoopbackEngine::echo());
    let (updates, received) = collector();
    let client = Client::builder(Arc::clone(&engine))
        .config(ClientConfig::responsive())
        .updates_handler(updates)
        .build()
        .unwrap();

    client.close();

    let updates: Vec<JsonObject> = received.try_iter().collect();
    assert_eq!(updates.len(), 2);
    assert!(!updates[0].is_closed_update());
    assert!(updates[1].is_closed_update());
}
