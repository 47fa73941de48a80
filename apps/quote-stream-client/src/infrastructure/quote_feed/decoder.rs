//! Quote Decoder
//!
//! Turns one frame payload into a quote update, or classifies it as
//! ignorable. Anything else is an error, and every error is fatal: the
//! stream has no resynchronization point once its contents are suspect.

use serde_json::Value;

use crate::domain::quote::QuoteUpdate;

use super::error::ClientError;
use super::messages::{IncomingEnvelope, QuotePayload, STATUS_OK};

/// Outcome of decoding one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A valid quote push.
    Quote(QuoteUpdate),
    /// A message that is not a quote push (session acks, completions, ...).
    Ignored {
        /// Message name.
        name: String,
    },
}

/// Decoder for quote push payloads.
#[derive(Debug, Default, Clone)]
pub struct QuoteDecoder;

impl QuoteDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one frame payload.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Decode`] if the payload is not an envelope
    /// - [`ClientError::Server`] for `error` / `critical_error` messages
    /// - [`ClientError::Payload`] for malformed or non-`ok` quote pushes
    pub fn decode(&self, payload: &[u8]) -> Result<Decoded, ClientError> {
        let envelope: IncomingEnvelope =
            serde_json::from_slice(payload).map_err(|source| ClientError::Decode {
                source,
                raw: String::from_utf8_lossy(payload).into_owned(),
            })?;

        if envelope.is_error() {
            return Err(ClientError::Server {
                name: envelope.name,
                raw: String::from_utf8_lossy(payload).into_owned(),
            });
        }

        if !envelope.is_quote_data() {
            return Ok(Decoded::Ignored {
                name: envelope.name,
            });
        }

        let quote = Self::quote_payload(envelope.payload, payload)?;

        if quote.status != STATUS_OK {
            return Err(ClientError::payload(
                format!("status is {:?}", quote.status),
                payload,
            ));
        }
        if quote.symbol.is_empty() {
            return Err(ClientError::payload("symbol is empty", payload));
        }
        let Some(data) = quote.data else {
            return Err(ClientError::payload("quote data is missing", payload));
        };

        Ok(Decoded::Quote(QuoteUpdate::new(quote.symbol, data)))
    }

    /// Extract `[routing_tag, {n, s, v}]` from a quote push.
    fn quote_payload(value: Option<Value>, raw: &[u8]) -> Result<QuotePayload, ClientError> {
        let Some(Value::Array(mut items)) = value else {
            return Err(ClientError::payload("payload is not an array", raw));
        };
        if items.len() != 2 {
            return Err(ClientError::payload(
                format!("payload has {} elements, expected 2", items.len()),
                raw,
            ));
        }

        let body = items.swap_remove(1);
        if !body.is_object() {
            return Err(ClientError::payload("quote body is not an object", raw));
        }

        serde_json::from_value(body)
            .map_err(|e| ClientError::payload(format!("quote body: {e}"), raw))
    }
}
