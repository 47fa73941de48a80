//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the protocol engine and the concrete implementations
//! of the port interfaces defined in the application layer.

/// Quote protocol engine (framing, handshake, keep-alive, decoding, client).
pub mod quote_feed;

/// WebSocket transport adapter.
pub mod websocket;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry integration.
pub mod telemetry;
