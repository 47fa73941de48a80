//! Prometheus Metrics Module
//!
//! Records client metrics through the `metrics` facade. Without an installed
//! recorder every call is a no-op, so the library never requires one.
//!
//! # Metrics Categories
//!
//! - **Messages**: raw receives, frames, heartbeats, ignored messages
//! - **Quotes**: dispatched updates and dropped duplicates
//! - **Commands**: commands sent by name
//! - **Errors**: fatal errors by context
//! - **Latency**: per-receive processing time

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::infrastructure::quote_feed::ErrorContext;

// =============================================================================
// Recorder Installation
// =============================================================================

/// Install the Prometheus recorder.
///
/// With `port == 0` the recorder is installed without a listener and its
/// handle is returned for rendering. Otherwise an HTTP listener serves the
/// scrape endpoint on `0.0.0.0:<port>`; this must run inside a tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(port: u16) -> Result<Option<PrometheusHandle>, BuildError> {
    let builder = PrometheusBuilder::new();

    let handle = if port == 0 {
        Some(builder.install_recorder()?)
    } else {
        builder
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        None
    };

    register_metrics();
    Ok(handle)
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_client_messages_received_total",
        "Raw transport messages received, by kind"
    );
    describe_counter!(
        "quote_client_frames_received_total",
        "Frames recovered from text messages"
    );
    describe_counter!(
        "quote_client_heartbeats_total",
        "Keep-alive pings echoed back to the server"
    );
    describe_counter!(
        "quote_client_messages_ignored_total",
        "Non-quote messages dropped without error"
    );
    describe_counter!(
        "quote_client_quotes_dispatched_total",
        "Quote updates handed to the handler"
    );
    describe_counter!(
        "quote_client_duplicates_dropped_total",
        "Quote updates dropped as duplicates within one receive"
    );
    describe_counter!(
        "quote_client_commands_sent_total",
        "Commands written to the server, by name"
    );
    describe_counter!(
        "quote_client_errors_total",
        "Connection-fatal errors, by context"
    );
    describe_counter!(
        "quote_client_events_dropped_total",
        "Handler events dropped because the consumer lagged"
    );
    describe_histogram!(
        "quote_client_receive_processing_seconds",
        "Time to split, decode and dispatch one receive"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a raw message received from the transport.
pub fn record_message_received(kind: &'static str) {
    counter!("quote_client_messages_received_total", "kind" => kind).increment(1);
}

/// Record frames recovered from one receive.
pub fn record_frames_received(count: u64) {
    counter!("quote_client_frames_received_total").increment(count);
}

/// Record an echoed heartbeat.
pub fn record_heartbeat() {
    counter!("quote_client_heartbeats_total").increment(1);
}

/// Record an ignored message.
pub fn record_message_ignored() {
    counter!("quote_client_messages_ignored_total").increment(1);
}

/// Record quote updates handed to the handler.
pub fn record_quotes_dispatched(count: u64) {
    counter!("quote_client_quotes_dispatched_total").increment(count);
}

/// Record duplicates dropped within one receive.
pub fn record_duplicates_dropped(count: u64) {
    counter!("quote_client_duplicates_dropped_total").increment(count);
}

/// Record a command written to the server.
pub fn record_command_sent(command: &'static str) {
    counter!("quote_client_commands_sent_total", "command" => command).increment(1);
}

/// Record a connection-fatal error.
pub fn record_error(context: ErrorContext) {
    counter!("quote_client_errors_total", "context" => context.as_str()).increment(1);
}

/// Record handler events dropped by a lagging consumer.
pub fn record_events_dropped(count: u64) {
    counter!("quote_client_events_dropped_total").increment(count);
}

/// Record how long one receive took to process.
pub fn record_processing_duration(duration: Duration) {
    histogram!("quote_client_receive_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
