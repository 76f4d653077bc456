/*!
 * Structured Tracing
 *
 * Subscriber setup for the library and the benchmark binary. The library
 * itself only emits events; installing a subscriber is the host's call.
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Switches the subscriber to JSON output when set to `1` or `true`
pub const TRACE_JSON_ENV: &str = "TDCLIENT_TRACE_JSON";

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - TDCLIENT_TRACE_JSON: Enable JSON output (default: false)
///
/// A second call is a no-op; the first installed subscriber stays.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(TRACE_JSON_ENV)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Timed span around a named operation, logging its duration on drop
pub struct OperationSpan {
    span: tracing::Span,
    start: Instant,
    operation: &'static str,
    slow_after_ms: u128,
}

impl OperationSpan {
    pub fn new(operation: &'static str) -> Self {
        let span = span!(
            Level::DEBUG,
            "operation",
            operation = operation,
            items = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            operation,
            slow_after_ms: 1000,
        }
    }

    /// Warn instead of debug when the operation takes longer than `ms`
    pub fn slow_after_ms(mut self, ms: u128) -> Self {
        self.slow_after_ms = ms;
        self
    }

    pub fn record_items(&self, count: usize) {
        self.span.record("items", count);
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();

        if duration.as_millis() > self.slow_after_ms {
            warn!(
                operation = self.operation,
                duration_ms = duration.as_millis(),
                slow = true,
                "slow operation detected"
            );
        } else {
            debug!(
                operation = self.operation,
                duration_us = duration.as_micros(),
                "operation completed"
            );
        }
    }
}

/// Start a timed span for `name`
#[inline]
pub fn span_operation(name: &'static str) -> OperationSpan {
    OperationSpan::new(name)
}
