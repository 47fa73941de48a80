//! Quote Handlers
//!
//! Callback seam between the receive loop and the caller. Callbacks run on
//! the receive task, so a slow handler stalls the stream; hand work off to
//! another task if it is not trivial.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::domain::quote::{QuoteData, QuoteUpdate};
use crate::infrastructure::metrics;

use super::error::{ClientError, ErrorContext};

/// Receives quote updates and fatal errors.
pub trait QuoteHandler: Send + Sync {
    /// Called once per distinct update within a receive.
    fn on_quote(&self, symbol: &str, data: &QuoteData);

    /// Called at most once per connection, after the transport is closed.
    fn on_error(&self, error: &ClientError, context: ErrorContext);
}

// =============================================================================
// Closure Adapter
// =============================================================================

/// Handler built from two closures.
pub struct FnHandler<Q, E> {
    on_quote: Q,
    on_error: E,
}

impl<Q, E> FnHandler<Q, E>
where
    Q: Fn(&str, &QuoteData) + Send + Sync,
    E: Fn(&ClientError, ErrorContext) + Send + Sync,
{
    /// Create a handler from quote and error callbacks.
    #[must_use]
    pub const fn new(on_quote: Q, on_error: E) -> Self {
        Self { on_quote, on_error }
    }
}

impl<Q, E> QuoteHandler for FnHandler<Q, E>
where
    Q: Fn(&str, &QuoteData) + Send + Sync,
    E: Fn(&ClientError, ErrorContext) + Send + Sync,
{
    fn on_quote(&self, symbol: &str, data: &QuoteData) {
        (self.on_quote)(symbol, data);
    }

    fn on_error(&self, error: &ClientError, context: ErrorContext) {
        (self.on_error)(error, context);
    }
}

impl<Q, E> std::fmt::Debug for FnHandler<Q, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

// =============================================================================
// Channel Adapter
// =============================================================================

/// Event forwarded by [`ChannelHandler`].
#[derive(Debug)]
pub enum QuoteEvent {
    /// A quote update.
    Quote(QuoteUpdate),
    /// The connection failed and is closed.
    Error {
        /// Error message.
        message: String,
        /// Phase that failed.
        context: ErrorContext,
    },
}

/// Handler that forwards events over a bounded channel.
///
/// Never blocks the receive loop: when the channel is full the event is
/// dropped and counted.
#[derive(Debug)]
pub struct ChannelHandler {
    tx: mpsc::Sender<QuoteEvent>,
    dropped: AtomicU64,
}

impl ChannelHandler {
    /// Create a handler and the receiver for its events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<QuoteEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events dropped because the consumer lagged or went away.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: QuoteEvent) {
        if let Err(e) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::record_events_dropped(1);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("Quote event channel full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!("Quote event receiver dropped");
                }
            }
        }
    }
}

impl QuoteHandler for ChannelHandler {
    fn on_quote(&self, symbol: &str, data: &QuoteData) {
        self.forward(QuoteEvent::Quote(QuoteUpdate::new(symbol, *data)));
    }

    fn on_error(&self, error: &ClientError, context: ErrorContext) {
        self.forward(QuoteEvent::Error {
            message: error.to_string(),
            context,
        });
    }
}
