//! Port Interfaces
//!
//! Defines the transport contract the quote client is written against,
//! following the Hexagonal Architecture pattern. Infrastructure adapters
//! (WebSocket, in-memory test doubles) implement these traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: opens a connection and hands back its two halves
//! - `FrameSink`: write half, shared by the caller and the keep-alive path
//! - `FrameSource`: read half, owned by the receive loop

use async_trait::async_trait;

/// A single message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    /// UTF-8 text message. The only kind the quote protocol uses.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
    /// Transport-level control traffic (ping, pong, raw frames).
    Control,
}

impl TransportMessage {
    /// Text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Errors raised by a transport adapter. Always connection-fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("failed to open connection: {0}")]
    Open(String),

    /// Reading from the connection failed.
    #[error("failed to read message: {0}")]
    Read(String),

    /// Writing to the connection failed.
    #[error("failed to write message: {0}")]
    Write(String),

    /// Closing the connection failed.
    #[error("failed to close connection: {0}")]
    Close(String),

    /// The remote side closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
}

/// Everything needed to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Extra request headers sent with the opening handshake.
    pub headers: Vec<(String, String)>,
}

impl ConnectRequest {
    /// Create a request without extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Write half of an open connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Write one message.
    async fn write_message(&mut self, message: TransportMessage) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an open connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next message.
    async fn read_message(&mut self) -> Result<TransportMessage, TransportError>;
}

/// Both halves of a freshly opened connection.
pub struct TransportPair {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for TransportPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPair").finish_non_exhaustive()
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the requested endpoint.
    async fn open(&self, request: &ConnectRequest) -> Result<TransportPair, TransportError>;
}
