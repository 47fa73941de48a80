//! Quote Client
//!
//! Connection engine for one quote session.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting -> Handshaking -> Streaming -> Closed
//! ```
//!
//! `connect` opens the transport, runs the handshake, sends the initial
//! subscriptions and spawns the receive loop. A failure before `Streaming`
//! closes the transport, reaches the handler once and is also returned from
//! `connect`.
//!
//! # Receive Loop
//!
//! One task owns the read half. Per message:
//!
//! 1. Non-text messages are skipped
//! 2. Pings are echoed and never decoded
//! 3. Everything else is split into frames and decoded in order
//! 4. Identical updates within the message are dispatched once
//!
//! The first fatal error closes the transport, then reaches the handler
//! exactly once. There is no reconnect.
//!
//! Writes race the cancellation token, so `close` never waits behind a
//! write stalled on a slow peer.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Connector, FrameSink, FrameSource, TransportMessage};
use crate::domain::quote::QuoteUpdate;
use crate::domain::session::{ConnectionState, SessionId};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics;

use super::codec::FrameCodec;
use super::decoder::{Decoded, QuoteDecoder};
use super::error::{ClientError, ErrorContext};
use super::handler::QuoteHandler;
use super::handshake::{SessionHandshake, send_command};
use super::heartbeat::KeepAlive;
use super::messages::Command;

/// Client for one streaming quote session.
///
/// Dropping the client stops the receive loop without reporting an error.
pub struct QuoteClient {
    engine: Arc<Engine>,
}

/// State shared between the caller and the receive loop.
struct Engine {
    session: SessionId,
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    state: RwLock<ConnectionState>,
    closed: AtomicBool,
    cancel: CancellationToken,
    handler: Arc<dyn QuoteHandler>,
    codec: FrameCodec,
    decoder: QuoteDecoder,
    keep_alive: KeepAlive,
}

impl QuoteClient {
    /// Connect, establish a session and start streaming.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the connection cannot be opened
    /// or an initial subscription fails, and [`ClientError::Handshake`] if
    /// session setup fails. The transport is closed and the handler receives
    /// the same error before it is returned.
    pub async fn connect(
        config: &ClientConfig,
        connector: &dyn Connector,
        handler: Arc<dyn QuoteHandler>,
    ) -> Result<Self, ClientError> {
        let mut rng = StdRng::from_os_rng();
        Self::connect_with_rng(config, connector, handler, &mut rng).await
    }

    /// Like [`QuoteClient::connect`], with an injected random source for the
    /// session identifier.
    ///
    /// # Errors
    ///
    /// See [`QuoteClient::connect`].
    pub async fn connect_with_rng<R>(
        config: &ClientConfig,
        connector: &dyn Connector,
        handler: Arc<dyn QuoteHandler>,
        rng: &mut R,
    ) -> Result<Self, ClientError>
    where
        R: Rng + Send + ?Sized,
    {
        let request = config.connect_request();
        tracing::info!(
            url = %request.url,
            state = ConnectionState::Connecting.as_str(),
            "Connecting to quote service"
        );

        let pair = match connector.open(&request).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(url = %request.url, error = %e, "Failed to open connection");
                return Err(connect_failed(handler.as_ref(), e.into(), ErrorContext::Connect));
            }
        };
        let mut sink = pair.sink;
        let mut source = pair.source;

        tracing::debug!(state = ConnectionState::Handshaking.as_str(), "Transport open");
        let handshake = SessionHandshake::new(config.auth_token.expose());
        let session = match handshake.perform(source.as_mut(), sink.as_mut(), rng).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Handshake failed");
                close_quietly(sink.as_mut()).await;
                return Err(connect_failed(handler.as_ref(), e.into(), ErrorContext::Handshake));
            }
        };

        let codec = FrameCodec::new();
        for symbol in &config.symbols {
            let command = Command::AddSymbol {
                session: &session,
                symbol: symbol.as_str(),
            };
            if let Err(e) = send_command(sink.as_mut(), &codec, command).await {
                tracing::error!(symbol = %symbol, error = %e, "Initial subscription failed");
                close_quietly(sink.as_mut()).await;
                return Err(connect_failed(handler.as_ref(), e.into(), ErrorContext::Send));
            }
        }

        let engine = Arc::new(Engine {
            session,
            sink: tokio::sync::Mutex::new(sink),
            state: RwLock::new(ConnectionState::Streaming),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handler,
            codec,
            decoder: QuoteDecoder::new(),
            keep_alive: KeepAlive::new(),
        });

        tracing::info!(
            session = %engine.session,
            symbols = config.symbols.len(),
            "Quote stream started"
        );

        tokio::spawn(Arc::clone(&engine).receive_loop(source));

        Ok(Self { engine })
    }

    /// Subscribe to a symbol.
    ///
    /// Subscribing twice re-sends the command.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the connection is closed, or the
    /// transport error if the write fails. A failed write closes the
    /// connection and is also reported to the handler.
    pub async fn add_symbol(&self, symbol: &str) -> Result<(), ClientError> {
        self.engine
            .send(Command::AddSymbol {
                session: &self.engine.session,
                symbol,
            })
            .await
    }

    /// Unsubscribe from a symbol.
    ///
    /// # Errors
    ///
    /// Same as [`QuoteClient::add_symbol`].
    pub async fn remove_symbol(&self, symbol: &str) -> Result<(), ClientError> {
        self.engine
            .send(Command::RemoveSymbol {
                session: &self.engine.session,
                symbol,
            })
            .await
    }

    /// Close the connection and stop the receive loop.
    ///
    /// The handler is not notified. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; transport close failures are only logged.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.engine.shutdown().await {
            tracing::info!(session = %self.engine.session, "Quote stream closed");
        }
        Ok(())
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.engine.state.read()
    }

    /// Client-generated session identifier.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.engine.session
    }

    /// Check if the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.engine.closed.load(Ordering::SeqCst)
    }
}

impl Drop for QuoteClient {
    fn drop(&mut self) {
        self.engine.cancel.cancel();
    }
}

impl std::fmt::Debug for QuoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteClient")
            .field("session", &self.engine.session)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Engine
// =============================================================================

impl Engine {
    async fn receive_loop(self: Arc<Self>, mut source: Box<dyn FrameSource>) {
        loop {
            let message = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = source.read_message() => result,
            };

            let outcome = match message {
                Ok(message) => self.process(message).await,
                Err(e) => Err((ClientError::Transport(e), ErrorContext::Read)),
            };

            if let Err((error, context)) = outcome {
                self.fail(&error, context).await;
                break;
            }
        }
        tracing::debug!(session = %self.session, "Receive loop stopped");
    }

    /// Handle one raw message. Returns the fatal error, if any.
    async fn process(&self, message: TransportMessage) -> Result<(), (ClientError, ErrorContext)> {
        let TransportMessage::Text(text) = message else {
            metrics::record_message_received("other");
            tracing::trace!("Skipping non-text message");
            return Ok(());
        };
        metrics::record_message_received("text");

        if self.keep_alive.is_heartbeat(&text) {
            let mut sink = self.sink.lock().await;
            return tokio::select! {
                biased;
                () = self.cancel.cancelled() => Ok(()),
                result = self.keep_alive.echo(sink.as_mut(), &text) => {
                    result.map_err(|e| (ClientError::Transport(e), ErrorContext::KeepAlive))
                }
            };
        }

        let started = Instant::now();
        let frames = self
            .codec
            .split_frames(text.as_bytes())
            .map_err(|e| (ClientError::Framing(e), ErrorContext::Framing))?;
        metrics::record_frames_received(frames.len() as u64);

        let mut updates = Vec::with_capacity(frames.len());
        let mut failure = None;
        for payload in frames {
            match self.decoder.decode(payload) {
                Ok(Decoded::Quote(update)) => updates.push(update),
                Ok(Decoded::Ignored { name }) => {
                    metrics::record_message_ignored();
                    tracing::trace!(name = %name, "Ignoring message");
                }
                Err(e) => {
                    let context = e.context();
                    failure = Some((e, context));
                    break;
                }
            }
        }

        self.dispatch(updates);
        metrics::record_processing_duration(started.elapsed());

        failure.map_or(Ok(()), Err)
    }

    fn dispatch(&self, updates: Vec<QuoteUpdate>) {
        let (unique, duplicates) = dedup(updates);
        if duplicates > 0 {
            metrics::record_duplicates_dropped(duplicates);
            tracing::trace!(duplicates, "Dropped duplicate updates");
        }

        let mut dispatched = 0_u64;
        for update in &unique {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            self.handler.on_quote(&update.symbol, &update.data);
            dispatched += 1;
        }
        metrics::record_quotes_dispatched(dispatched);
    }

    async fn send(&self, command: Command<'_>) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let result = {
            let mut sink = self.sink.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(ClientError::Closed);
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ClientError::Closed),
                result = send_command(sink.as_mut(), &self.codec, command) => result,
            }
        };

        if let Err(e) = result {
            let error = ClientError::Transport(e);
            self.fail(&error, ErrorContext::Send).await;
            return Err(error);
        }
        Ok(())
    }

    /// Close the transport, then report `error` if this call won the close.
    async fn fail(&self, error: &ClientError, context: ErrorContext) {
        if !self.shutdown().await {
            return;
        }
        metrics::record_error(context);
        tracing::error!(
            session = %self.session,
            context = %context,
            error = %error,
            "Quote stream failed"
        );
        self.handler.on_error(error, context);
    }

    /// Transition to `Closed`. Returns `false` if already closed.
    async fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        close_quietly(self.sink.lock().await.as_mut()).await;
        *self.state.write() = ConnectionState::Closed;
        true
    }
}

/// Report a failure that happened before streaming began.
fn connect_failed(
    handler: &dyn QuoteHandler,
    error: ClientError,
    context: ErrorContext,
) -> ClientError {
    metrics::record_error(context);
    handler.on_error(&error, context);
    error
}

async fn close_quietly(sink: &mut dyn FrameSink) {
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "Transport close failed");
    }
}

/// Keep the first occurrence of each distinct update, in order.
///
/// Returns the survivors and the number of duplicates dropped.
fn dedup(updates: Vec<QuoteUpdate>) -> (Vec<QuoteUpdate>, u64) {
    let mut seen = HashSet::with_capacity(updates.len());
    let mut duplicates = 0;
    let unique = updates
        .into_iter()
        .filter(|update| {
            let fresh = seen.insert(update.dedup_key());
            if !fresh {
                duplicates += 1;
            }
            fresh
        })
        .collect();
    (unique, duplicates)
}
