/*!
 * Close Tests
 * Teardown protocol, synthetic close errors and the live-client count
 */

use crate::support::{client, collector, wait_until, WAIT};
use pretty_assertions::assert_eq;
use serial_test::{parallel, serial};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tdclient::{
    live_client_count, result_handler, Client, ClientConfig, ClientError, JsonObject, JsonQuery,
    LoopbackEngine, Reply, Response,
};

const CLOSED: (i32, &str) = (500, "Client is closed");

#[test]
#[serial]
fn test_close_fails_pending_calls() {
    let engine = Arc::new(LoopbackEngine::holding());
    let before = live_client_count();
    let client = client(&engine);
    assert_eq!(live_client_count(), before + 1);

    let (handler, results) = collector();
    for _ in 0..3 {
        client
            .send(Some(JsonQuery::new("getMe")), Some(handler.clone()), None)
            .unwrap();
    }
    assert_eq!(client.pending_count(), 3);

    client.close();

    let errors: Vec<(i32, String)> = results
        .try_iter()
        .map(|r| {
            let (code, message) = r.as_error().expect("expected an error result");
            (code, message.to_string())
        })
        .collect();
    assert_eq!(errors.len(), 3);
    for (code, message) in errors {
        assert_eq!((code, message.as_str()), CLOSED);
    }

    assert_eq!(client.pending_count(), 0);
    assert_eq!(live_client_count(), before);
    assert!(client.is_closed());
    assert!(client.is_drain_stopped());
    assert_eq!(engine.destroyed_clients(), 1);
    assert_eq!(engine.live_clients(), 0);
}

#[test]
#[serial]
fn test_close_is_idempotent() {
    let engine = Arc::new(LoopbackEngine::echo());
    let before = live_client_count();
    {
        let client = client(&engine);
        client.close();
        client.close();
        assert_eq!(live_client_count(), before);
        // Drop closes again
    }
    assert_eq!(live_client_count(), before);
    assert_eq!(engine.destroyed_clients(), 1);
}

#[test]
#[serial]
fn test_drop_closes_client() {
    let engine = Arc::new(LoopbackEngine::holding());
    let before = live_client_count();
    let (handler, results) = collector();
    {
        let client = client(&engine);
        client
            .send(Some(JsonQuery::new("getMe")), Some(handler), None)
            .unwrap();
    }

    let result = results.try_recv().expect("pending call not failed on drop");
    assert_eq!(result.as_error(), Some(CLOSED));
    assert_eq!(live_client_count(), before);
}

#[test]
#[parallel]
fn test_send_after_close_gets_closed_error() {
    let engine = Arc::new(LoopbackEngine::echo());
    let client = client(&engine);
    client.close();

    let (handler, results) = collector();
    client
        .send(Some(JsonQuery::new("getMe")), Some(handler), None)
        .unwrap();

    // Delivered synchronously on the calling thread
    let result = results.try_recv().expect("closed error not delivered");
    assert_eq!(result.as_error(), Some(CLOSED));

    // Without a handler the query is silently dropped
    client.send(Some(JsonQuery::new("getMe")), None, None).unwrap();
    assert_eq!(client.pending_count(), 0);
}

#[test]
#[parallel]
fn test_close_error_is_configurable() {
    let engine = Arc::new(LoopbackEngine::echo());
    let config = ClientConfig {
        closed_error_code: 406,
        closed_error_message: "Instance closed".to_string(),
        ..ClientConfig::responsive()
    };
    let client = Client::builder(engine).config(config).build().unwrap();
    client.close();

    let (handler, results) = collector();
    client.send_with(JsonQuery::new("getMe"), handler);
    assert_eq!(
        results.try_recv().unwrap().as_error(),
        Some((406, "Instance closed"))
    );
}

#[test]
#[serial]
fn test_close_from_result_handler() {
    let engine = Arc::new(LoopbackEngine::echo());
    let before = live_client_count();
    let client = Arc::new(client(&engine));
    let weak = Arc::downgrade(&client);
    let (tx, rx) = flume::unbounded();

    client
        .send(
            Some(JsonQuery::new("getMe")),
            Some(result_handler(move |_: JsonObject| {
                if let Some(client) = weak.upgrade() {
                    client.close();
                    let _ = tx.send(client.is_closed());
                }
            })),
            None,
        )
        .unwrap();

    // close on the drain thread returns without waiting for the loop
    assert_eq!(rx.recv_timeout(WAIT), Ok(true));
    assert!(wait_until(|| client.is_drain_stopped()));
    assert!(wait_until(|| live_client_count() == before));
    assert!(wait_until(|| engine.destroyed_clients() == 1));

    drop(client);
    assert_eq!(live_client_count(), before);
}

#[test]
#[serial]
fn test_invalid_config_is_rejected() {
    let engine = Arc::new(LoopbackEngine::echo());
    let before = live_client_count();
    let config = ClientConfig {
        max_events: 0,
        ..ClientConfig::responsive()
    };

    let err = Client::builder(engine.clone()).config(config).build().err();
    assert!(matches!(err, Some(ClientError::Configuration(_))));
    assert_eq!(live_client_count(), before);
    assert_eq!(engine.live_clients(), 0);
}

/// Answers queries carrying `"hold": false`, holds the rest
fn half_holding_engine() -> LoopbackEngine {
    LoopbackEngine::new(|query| {
        match query.value().get("hold").and_then(|v| v.as_bool()) {
            Some(false) => Reply::Respond(JsonObject::ok()),
            _ => Reply::Hold,
        }
    })
}

#[test]
#[parallel]
fn test_close_racing_submitters_resolves_each_call_once() {
    const ROUNDS: usize = 10;
    const SUBMITTERS: usize = 4;
    const PER_SUBMITTER: usize = 400;

    for round in 0..ROUNDS {
        let engine = Arc::new(half_holding_engine());
        let client = client(&engine);
        let submitted = AtomicUsize::new(0);
        let counters: Vec<Vec<Arc<AtomicUsize>>> = (0..SUBMITTERS)
            .map(|_| {
                (0..PER_SUBMITTER)
                    .map(|_| Arc::new(AtomicUsize::new(0)))
                    .collect()
            })
            .collect();

        thread::scope(|scope| {
            for counters in &counters {
                let client = &client;
                let submitted = &submitted;
                scope.spawn(move || {
                    for (i, counter) in counters.iter().enumerate() {
                        let counter = Arc::clone(counter);
                        let query = JsonQuery::new("getMe").with("hold", i % 2 == 0);
                        client
                            .send(
                                Some(query),
                                Some(result_handler(move |_: JsonObject| {
                                    counter.fetch_add(1, Ordering::SeqCst);
                                })),
                                None,
                            )
                            .unwrap();
                        submitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }

            scope.spawn(|| {
                let target = SUBMITTERS * PER_SUBMITTER / 2;
                while submitted.load(Ordering::SeqCst) < target {
                    thread::yield_now();
                }
                client.close();
            });
        });

        for (submitter, counters) in counters.iter().enumerate() {
            for (i, counter) in counters.iter().enumerate() {
                assert_eq!(
                    counter.load(Ordering::SeqCst),
                    1,
                    "round {round}, submitter {submitter}, query {i}"
                );
            }
        }
        assert_eq!(client.pending_count(), 0);
        assert!(client.is_closed());
    }
}
