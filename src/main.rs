/*!
 * tdclient - Loopback Throughput Tool
 *
 * Drives a client over the in-process loopback engine:
 * - N identical queries through `bench` (first argument, default 10000)
 * - Waits for every result, then reports throughput
 * - Closes the client and checks that nothing is left pending
 */

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use tdclient::monitoring::span_operation;
use tdclient::{
    init_tracing, live_client_count, result_handler, Client, ClientConfig, JsonQuery,
    LoopbackEngine,
};

const DEFAULT_QUERY_COUNT: usize = 10_000;
const RESULT_WAIT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    init_tracing();

    let count = match std::env::args().nth(1) {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("query count must be a number, got {raw:?}"))?,
        None => DEFAULT_QUERY_COUNT,
    };

    let config = ClientConfig::from_env().context("invalid TDCLIENT_* configuration")?;
    info!(
        receive_timeout_ms = config.receive_timeout.as_millis() as u64,
        max_events = config.max_events,
        "Configuration loaded"
    );

    let engine = Arc::new(LoopbackEngine::echo());
    let client = Client::builder(Arc::clone(&engine))
        .config(config)
        .build()
        .context("failed to create client")?;
    info!(client = %client.engine_client_id(), live = live_client_count(), "Client ready");

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let handler = result_handler(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let span = span_operation("bench");
    let started = Instant::now();
    client.bench(Some(JsonQuery::new("testCallEmpty")), Some(handler), count)?;

    while received.load(Ordering::Relaxed) < count {
        if started.elapsed() > RESULT_WAIT {
            bail!(
                "only {} of {} results arrived within {:?}",
                received.load(Ordering::Relaxed),
                count,
                RESULT_WAIT
            );
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    let elapsed = started.elapsed();
    span.record_items(count);
    drop(span);

    let per_sec = count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        queries = count,
        elapsed_ms = elapsed.as_millis() as u64,
        per_sec = per_sec as u64,
        "Bench finished"
    );
    println!("{count} queries in {elapsed:?} ({per_sec:.0}/s)");

    client.close();
    if client.pending_count() != 0 {
        warn!(pending = client.pending_count(), "Calls left pending after close");
    }
    info!(live = live_client_count(), "Client closed");
    Ok(())
}
