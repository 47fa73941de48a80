//! Quote Feed Message Types
//!
//! Envelopes and commands exchanged with the quote service.
//!
//! # Envelope
//!
//! ```json
//! {"m": "<message name>", "p": <payload>}
//! ```
//!
//! # Quote Push
//!
//! ```json
//! {"m":"qsd","p":["qs_abc",{"n":"OANDA:EURUSD","s":"ok","v":{"lp":1.23,"bid":1.22}}]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::quote::{QUOTE_FIELDS, QuoteData};
use crate::domain::session::SessionId;

// =============================================================================
// Constants
// =============================================================================

/// Name of quote push messages.
pub const QUOTE_DATA: &str = "qsd";

/// Name of recoverable-looking server errors (still fatal for us).
pub const SERVER_ERROR: &str = "error";

/// Name of fatal server errors.
pub const CRITICAL_ERROR: &str = "critical_error";

/// Status carried by a valid quote push.
pub const STATUS_OK: &str = "ok";

/// Token used by sessions that are not logged in.
pub const ANONYMOUS_AUTH_TOKEN: &str = "unauthorized_user_token";

/// Flag asking the server to stream a symbol even without explicit entitlement.
pub const FORCE_PERMISSION_FLAG: &str = "force_permission";

// =============================================================================
// Envelopes
// =============================================================================

/// Outgoing envelope, borrowing its parts.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, P: ?Sized> {
    /// Message name.
    #[serde(rename = "m")]
    pub name: &'a str,
    /// Message payload.
    #[serde(rename = "p")]
    pub payload: &'a P,
}

impl<'a, P: ?Sized> Envelope<'a, P> {
    /// Create a new envelope.
    #[must_use]
    pub const fn new(name: &'a str, payload: &'a P) -> Self {
        Self { name, payload }
    }
}

/// Incoming envelope with an arbitrary payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingEnvelope {
    /// Message name. Missing names decode as empty and are ignored.
    #[serde(rename = "m", default)]
    pub name: String,
    /// Message payload, if any.
    #[serde(rename = "p", default)]
    pub payload: Option<Value>,
}

impl IncomingEnvelope {
    /// Check if the server signalled an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.name == SERVER_ERROR || self.name == CRITICAL_ERROR
    }

    /// Check if this is a quote push.
    #[must_use]
    pub fn is_quote_data(&self) -> bool {
        self.name == QUOTE_DATA
    }
}

/// Second element of a quote push payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuotePayload {
    /// Instrument name.
    #[serde(rename = "n", default)]
    pub symbol: String,
    /// Push status, `ok` when valid.
    #[serde(rename = "s", default)]
    pub status: String,
    /// Changed fields.
    #[serde(rename = "v", default)]
    pub data: Option<QuoteData>,
}

/// First message sent by the server after the connection opens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHello {
    /// Server-side session context. Must be present and non-null.
    #[serde(default)]
    pub session_id: Option<Value>,
}

impl ServerHello {
    /// Check if the server supplied a session context.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session_id.as_ref().is_some_and(|v| !v.is_null())
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Commands sent by the client.
#[derive(Debug, Clone, Copy)]
pub enum Command<'a> {
    /// Authenticate the connection.
    SetAuthToken {
        /// Auth token, anonymous by default.
        token: &'a str,
    },
    /// Create a quote session.
    CreateSession {
        /// Client-generated session identifier.
        session: &'a SessionId,
    },
    /// Register the quote fields to stream.
    SetFields {
        /// Session the fields apply to.
        session: &'a SessionId,
    },
    /// Start streaming a symbol.
    AddSymbol {
        /// Session the symbol is added to.
        session: &'a SessionId,
        /// Instrument name.
        symbol: &'a str,
    },
    /// Stop streaming a symbol.
    RemoveSymbol {
        /// Session the symbol is removed from.
        session: &'a SessionId,
        /// Instrument name.
        symbol: &'a str,
    },
}

impl Command<'_> {
    /// Message name on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetAuthToken { .. } => "set_auth_token",
            Self::CreateSession { .. } => "quote_create_session",
            Self::SetFields { .. } => "quote_set_fields",
            Self::AddSymbol { .. } => "quote_add_symbols",
            Self::RemoveSymbol { .. } => "quote_remove_symbols",
        }
    }

    /// Message payload on the wire.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::SetAuthToken { token } => json!([token]),
            Self::CreateSession { session } => json!([session.as_str()]),
            Self::SetFields { session } => {
                let mut items = vec![Value::from(session.as_str())];
                items.extend(QUOTE_FIELDS.iter().map(|&field| Value::from(field)));
                Value::Array(items)
            }
            Self::AddSymbol { session, symbol } => json!([
                session.as_str(),
                symbol,
                { "flags": [FORCE_PERMISSION_FLAG] }
            ]),
            Self::RemoveSymbol { session, symbol } => json!([session.as_str(), symbol]),
        }
    }
}
