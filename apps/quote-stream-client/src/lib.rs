#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Stream Client - Streaming Market Data Client
//!
//! Maintains a single WebSocket session with a quote-distribution service,
//! decodes its length-prefixed multiplexed frames and hands deduplicated
//! quote updates to a caller-supplied handler.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quote and session types
//!   - `quote`: Partial quote field sets and dedup identity
//!   - `session`: Session identifiers and connection state
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport connector, read half and write half
//!
//! - **Infrastructure**: Protocol engine and adapters
//!   - `quote_feed`: Framing, handshake, keep-alive, decoding, client
//!   - `websocket`: `tokio-tungstenite` transport
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──► FrameSource ──► receive loop ──┬─► ping? ──► echo ──► FrameSink
//!                                              │
//!                                              └─► split ──► decode ──► dedup ──► QuoteHandler
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Quote and session types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Protocol engine and adapters.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{QuoteData, QuoteUpdate};
pub use domain::session::{ConnectionState, SessionId};

// Ports
pub use application::ports::{
    ConnectRequest, Connector, FrameSink, FrameSource, TransportError, TransportMessage,
    TransportPair,
};

// Client
pub use infrastructure::quote_feed::{
    ChannelHandler, ClientError, ErrorContext, FnHandler, QuoteClient, QuoteEvent, QuoteHandler,
};

// Transport
pub use infrastructure::websocket::WsConnector;

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
