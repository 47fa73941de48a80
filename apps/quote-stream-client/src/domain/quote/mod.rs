//! Quote Types
//!
//! A quote push only carries the fields that changed since the previous push
//! for the same symbol. Every field is therefore optional: `None` means
//! "unchanged", never zero.

use serde::{Deserialize, Serialize};

/// Field short names registered with the server, in registration order.
pub const QUOTE_FIELDS: [&str; 4] = ["lp", "volume", "bid", "ask"];

/// Partial set of quote fields carried by a single push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteData {
    /// Last traded price.
    #[serde(rename = "lp", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Traded volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Best bid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    /// Best ask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
}

impl QuoteData {
    /// Returns `true` if no field changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.price.is_none() && self.volume.is_none() && self.bid.is_none() && self.ask.is_none()
    }

    /// Bit-exact identity of the field set, usable as a hash key.
    fn bits(&self) -> [Option<u64>; 4] {
        [
            self.price.map(f64::to_bits),
            self.volume.map(f64::to_bits),
            self.bid.map(f64::to_bits),
            self.ask.map(f64::to_bits),
        ]
    }
}

/// A decoded quote push for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteUpdate {
    /// Instrument name as sent by the server, e.g. `OANDA:EURUSD`.
    pub symbol: String,
    /// Fields that changed.
    pub data: QuoteData,
}

impl QuoteUpdate {
    /// Create a new quote update.
    #[must_use]
    pub fn new(symbol: impl Into<String>, data: QuoteData) -> Self {
        Self {
            symbol: symbol.into(),
            data,
        }
    }

    /// Key under which two updates with identical content collide.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            symbol: self.symbol.clone(),
            fields: self.data.bits(),
        }
    }
}

/// Hashable identity of a [`QuoteUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    symbol: String,
    fields: [Option<u64>; 4],
}
