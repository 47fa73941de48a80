//! Quote Feed Errors
//!
//! Every error in this module is connection-fatal. The [`ErrorContext`] tag
//! tells the handler which phase failed.

use crate::application::ports::TransportError;

use super::codec::FramingError;

/// Errors raised while establishing the session.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The first message could not be read.
    #[error("failed to read first message: {0}")]
    Read(#[source] TransportError),

    /// The first message was not a framed JSON object.
    #[error("failed to decode first message: {0}")]
    Decode(String),

    /// The first message carried no server session context.
    #[error("first message after connecting has no session_id")]
    MissingSession,

    /// A setup command could not be sent.
    #[error("failed to send {command}: {source}")]
    Send {
        /// Name of the command that failed.
        command: &'static str,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

/// Errors surfaced by the quote client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed frame length prefix.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Session setup failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// A payload was not a valid envelope.
    #[error("failed to decode message: {source} (raw: {raw})")]
    Decode {
        /// JSON error.
        #[source]
        source: serde_json::Error,
        /// Offending payload.
        raw: String,
    },

    /// A quote push had an unexpected shape or status.
    #[error("invalid quote payload: {reason} (raw: {raw})")]
    Payload {
        /// What was wrong.
        reason: String,
        /// Offending payload.
        raw: String,
    },

    /// The server signalled an error.
    #[error("server sent {name}: {raw}")]
    Server {
        /// `error` or `critical_error`.
        name: String,
        /// Full message.
        raw: String,
    },

    /// The connection is already closed.
    #[error("connection is closed")]
    Closed,
}

impl ClientError {
    /// Phase tag for this error when no more specific one is known.
    #[must_use]
    pub const fn context(&self) -> ErrorContext {
        match self {
            Self::Transport(_) | Self::Closed => ErrorContext::Send,
            Self::Framing(_) => ErrorContext::Framing,
            Self::Handshake(_) => ErrorContext::Handshake,
            Self::Decode { .. } => ErrorContext::Decode,
            Self::Payload { .. } => ErrorContext::Payload,
            Self::Server { .. } => ErrorContext::Server,
        }
    }

    /// Check if this is the closed-connection error.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub(crate) fn payload(reason: impl Into<String>, raw: &[u8]) -> Self {
        Self::Payload {
            reason: reason.into(),
            raw: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}

/// Phase in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorContext {
    /// Opening the transport.
    Connect,
    /// Session setup.
    Handshake,
    /// Reading from the transport.
    Read,
    /// Splitting a message into frames.
    Framing,
    /// Decoding an envelope.
    Decode,
    /// Server-signalled error.
    Server,
    /// Validating a quote push.
    Payload,
    /// Echoing a heartbeat.
    KeepAlive,
    /// Sending a command.
    Send,
}

impl ErrorContext {
    /// Short tag, also used as a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Handshake => "handshake",
            Self::Read => "read",
            Self::Framing => "framing",
            Self::Decode => "decode",
            Self::Server => "server",
            Self::Payload => "payload",
            Self::KeepAlive => "keep_alive",
            Self::Send => "send",
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
