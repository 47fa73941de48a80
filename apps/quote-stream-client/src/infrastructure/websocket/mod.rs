//! WebSocket Transport Adapter
//!
//! Implements the transport ports on top of `tokio-tungstenite`. The stream
//! is split so the receive loop can own the read half while commands and
//! keep-alive echoes share the write half.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{
    ConnectRequest, Connector, FrameSink, FrameSource, TransportError, TransportMessage,
    TransportPair,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build the opening-handshake request with the extra headers applied.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] for an invalid URL or header.
    pub fn build_request(request: &ConnectRequest) -> Result<Request, TransportError> {
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Open(format!("invalid url {}: {e}", request.url)))?;

        let headers = ws_request.headers_mut();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Open(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Open(format!("invalid value for {name}: {e}")))?;
            headers.insert(name, value);
        }

        Ok(ws_request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<TransportPair, TransportError> {
        let ws_request = Self::build_request(request)?;

        let (stream, response) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        tracing::debug!(url = %request.url, status = %response.status(), "WebSocket connected");

        let (write, read) = stream.split();
        Ok(TransportPair {
            sink: Box::new(WsSink(write)),
            source: Box::new(WsSource(read)),
        })
    }
}

/// Write half of a WebSocket connection.
pub struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn write_message(&mut self, message: TransportMessage) -> Result<(), TransportError> {
        let message = match message {
            TransportMessage::Text(text) => Message::Text(text.into()),
            TransportMessage::Binary(data) => Message::Binary(data.into()),
            TransportMessage::Control => return Ok(()),
        };
        self.0.send(message).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            other => TransportError::Write(other.to_string()),
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.0.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Close(e.to_string())),
        }
    }
}

/// Read half of a WebSocket connection.
pub struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSource for WsSource {
    async fn read_message(&mut self) -> Result<TransportMessage, TransportError> {
        match self.0.next().await {
            Some(Ok(message)) => convert_incoming(message),
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                Err(TransportError::ConnectionClosed)
            }
            Some(Err(e)) => Err(TransportError::Read(e.to_string())),
        }
    }
}

fn convert_incoming(message: Message) -> Result<TransportMessage, TransportError> {
    match message {
        Message::Text(text) => Ok(TransportMessage::Text(text.as_str().to_owned())),
        Message::Binary(data) => Ok(TransportMessage::Binary(data.to_vec())),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(TransportMessage::Control),
        Message::Close(frame) => {
            tracing::info!(frame = ?frame, "Server sent close frame");
            Err(TransportError::ConnectionClosed)
        }
    }
}
