//! Session Types
//!
//! The client names its quote session itself. The identifier is generated
//! once per connection and prefixes every subscription command.

use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;

/// Prefix of every client-generated quote session identifier.
pub const SESSION_PREFIX: &str = "qs_";

/// Number of random alphanumeric characters after the prefix.
pub const SESSION_RANDOM_LEN: usize = 12;

/// Client-side quote session identifier (`qs_` + 12 alphanumerics).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier from the given random source.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let suffix: String = rng
            .sample_iter(Alphanumeric)
            .take(SESSION_RANDOM_LEN)
            .map(char::from)
            .collect();
        Self(format!("{SESSION_PREFIX}{suffix}"))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a single connection.
///
/// `Connecting -> Handshaking -> Streaming -> Closed`. Any failure before
/// `Streaming` goes straight to `Closed`; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Transport is being opened.
    #[default]
    Connecting,
    /// Transport is open, session setup in progress.
    Handshaking,
    /// Session established, receive loop running.
    Streaming,
    /// Connection closed, explicitly or after a fatal error.
    Closed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        }
    }
}
