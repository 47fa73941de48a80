//! Shared test fixtures: an in-memory scripted transport and a recording
//! handler.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use quote_stream_client::{
    ClientConfig, ClientError, ConnectRequest, Connector, ErrorContext, FrameSink, FrameSource,
    QuoteClient, QuoteData, QuoteHandler, TransportError, TransportMessage, TransportPair,
};

/// How long a test waits for an expected event.
pub const WAIT: Duration = Duration::from_secs(2);

/// How long a test waits to confirm that nothing happens.
pub const QUIET: Duration = Duration::from_millis(100);

/// Server hello carrying a session context.
pub const HELLO: &str = r#"{"session_id":"<0.17.1>_abc","timestamp":1700000000,"release":"x"}"#;

/// Frame a payload.
pub fn frame(payload: &str) -> String {
    format!("~m~{}~m~{payload}", payload.len())
}

/// A valid quote push.
pub fn qsd(symbol: &str, data: &str) -> String {
    format!(r#"{{"m":"qsd","p":["qs_test",{{"n":"{symbol}","s":"ok","v":{data}}}]}}"#)
}

// =============================================================================
// Scripted Transport
// =============================================================================

/// Server side of the scripted transport.
pub struct ScriptedServer {
    inbound: mpsc::UnboundedSender<Result<TransportMessage, TransportError>>,
    written: mpsc::UnboundedReceiver<TransportMessage>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
    write_budget: Arc<AtomicUsize>,
}

impl ScriptedServer {
    /// Deliver a text message to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        self.inbound
            .send(Ok(TransportMessage::Text(text.into())))
            .unwrap();
    }

    /// Deliver an arbitrary message to the client.
    pub fn send(&self, message: TransportMessage) {
        self.inbound.send(Ok(message)).unwrap();
    }

    /// Make the next read fail.
    pub fn fail_read(&self, error: TransportError) {
        self.inbound.send(Err(error)).unwrap();
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Let `n` more writes through, then fail the rest.
    pub fn fail_writes_after(&self, n: usize) {
        self.write_budget.store(n, Ordering::SeqCst);
    }

    /// Make every subsequent write hang, as with a peer that stopped reading.
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Check if the client closed its write half.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the next text message written by the client.
    pub async fn next_written(&mut self) -> String {
        let message = timeout(WAIT, self.written.recv())
            .await
            .expect("timed out waiting for a client write")
            .expect("client sink dropped");
        match message {
            TransportMessage::Text(text) => text,
            other => panic!("unexpected write: {other:?}"),
        }
    }

    /// Wait for the next written command and decode its envelope.
    pub async fn next_command(&mut self) -> (String, Value) {
        let text = self.next_written().await;
        let (len, json) = text
            .strip_prefix("~m~")
            .and_then(|rest| rest.split_once("~m~"))
            .expect("written message is framed");
        assert_eq!(len.parse::<usize>().unwrap(), json.len(), "frame length");

        let envelope: Value = serde_json::from_str(json).unwrap();
        (
            envelope["m"].as_str().unwrap().to_string(),
            envelope["p"].clone(),
        )
    }

    /// Assert the client writes nothing for a short while.
    pub async fn assert_no_write(&mut self) {
        if let Ok(Some(message)) = timeout(QUIET, self.written.recv()).await {
            panic!("unexpected write: {message:?}");
        }
    }
}

struct ScriptedSink {
    written: mpsc::UnboundedSender<TransportMessage>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
    write_budget: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn write_message(&mut self, message: TransportMessage) -> Result<(), TransportError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let over_budget = self
            .write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err();
        if over_budget || self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Write("broken pipe".to_string()));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let _ = self.written.send(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedSource {
    inbound: mpsc::UnboundedReceiver<Result<TransportMessage, TransportError>>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn read_message(&mut self) -> Result<TransportMessage, TransportError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }
}

/// Connector that hands out one scripted connection.
pub struct ScriptedConnector {
    pair: Mutex<Option<TransportPair>>,
    requests: Mutex<Vec<ConnectRequest>>,
}

impl ScriptedConnector {
    /// Requests seen by `open`.
    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<TransportPair, TransportError> {
        self.requests.lock().push(request.clone());
        self.pair
            .lock()
            .take()
            .ok_or_else(|| TransportError::Open("connection refused".to_string()))
    }
}

/// Create a connected scripted transport.
pub fn scripted() -> (ScriptedConnector, ScriptedServer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let fail_writes = Arc::new(AtomicBool::new(false));
    let stall_writes = Arc::new(AtomicBool::new(false));
    let write_budget = Arc::new(AtomicUsize::new(usize::MAX));

    let pair = TransportPair {
        sink: Box::new(ScriptedSink {
            written: written_tx,
            closed: Arc::clone(&closed),
            fail_writes: Arc::clone(&fail_writes),
            stall_writes: Arc::clone(&stall_writes),
            write_budget: Arc::clone(&write_budget),
        }),
        source: Box::new(ScriptedSource {
            inbound: inbound_rx,
        }),
    };

    (
        ScriptedConnector {
            pair: Mutex::new(Some(pair)),
            requests: Mutex::new(Vec::new()),
        },
        ScriptedServer {
            inbound: inbound_tx,
            written: written_rx,
            closed,
            fail_writes,
            stall_writes,
            write_budget,
        },
    )
}

/// Connector whose connections always fail to open.
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn open(&self, _request: &ConnectRequest) -> Result<TransportPair, TransportError> {
        Err(TransportError::Open("connection refused".to_string()))
    }
}

// =============================================================================
// Recording Handler
// =============================================================================

/// Event seen by [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// `on_quote` call.
    Quote(String, QuoteData),
    /// `on_error` call.
    Error {
        /// Phase tag.
        context: ErrorContext,
        /// Error variant name.
        kind: &'static str,
    },
}

/// Handler that records every callback, in order.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Recorded>,
}

impl QuoteHandler for Recorder {
    fn on_quote(&self, symbol: &str, data: &QuoteData) {
        let _ = self.tx.send(Recorded::Quote(symbol.to_string(), *data));
    }

    fn on_error(&self, error: &ClientError, context: ErrorContext) {
        let kind = match error {
            ClientError::Transport(_) => "transport",
            ClientError::Framing(_) => "framing",
            ClientError::Handshake(_) => "handshake",
            ClientError::Decode { .. } => "decode",
            ClientError::Payload { .. } => "payload",
            ClientError::Server { .. } => "server",
            ClientError::Closed => "closed",
        };
        let _ = self.tx.send(Recorded::Error { context, kind });
    }
}

/// Receiving side of a [`Recorder`].
pub struct Recording {
    rx: mpsc::UnboundedReceiver<Recorded>,
}

impl Recording {
    /// Wait for the next callback.
    pub async fn next(&mut self) -> Recorded {
        timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a handler callback")
            .expect("recorder dropped")
    }

    /// Assert no callback arrives for a short while.
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(event)) = timeout(QUIET, self.rx.recv()).await {
            panic!("unexpected callback: {event:?}");
        }
    }
}

/// Create a recording handler.
pub fn recorder() -> (Arc<Recorder>, Recording) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder { tx }), Recording { rx })
}

// =============================================================================
// Setup
// =============================================================================

/// Client connected to a scripted server, past the handshake.
pub struct Harness {
    pub client: QuoteClient,
    pub server: ScriptedServer,
    pub recording: Recording,
    pub connector: ScriptedConnector,
}

/// Connect with `config`, consuming the three setup commands.
pub async fn connect_with(config: ClientConfig) -> Harness {
    let (connector, mut server) = scripted();
    let (handler, recording) = recorder();
    server.send_text(frame(HELLO));

    let mut rng = StdRng::seed_from_u64(42);
    let client = QuoteClient::connect_with_rng(&config, &connector, handler, &mut rng)
        .await
        .unwrap();

    for expected in ["set_auth_token", "quote_create_session", "quote_set_fields"] {
        let (name, _) = server.next_command().await;
        assert_eq!(name, expected);
    }

    Harness {
        client,
        server,
        recording,
        connector,
    }
}

/// Connect with the default configuration.
pub async fn connect() -> Harness {
    connect_with(ClientConfig::default()).await
}
