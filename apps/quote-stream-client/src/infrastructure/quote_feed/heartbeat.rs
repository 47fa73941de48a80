//! Keep-Alive Responder
//!
//! The server probes liveness with `~m~<n>~m~~h~<counter>` pings. The client
//! must echo each ping back unchanged or the server drops the session.
//! Pings are never decoded.

use crate::application::ports::{FrameSink, TransportError, TransportMessage};
use crate::infrastructure::metrics;

use super::codec::FrameCodec;

/// Detects and echoes keep-alive pings.
#[derive(Debug, Default, Clone)]
pub struct KeepAlive {
    codec: FrameCodec,
}

impl KeepAlive {
    /// Create a new keep-alive responder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            codec: FrameCodec::new(),
        }
    }

    /// Check whether a raw text message is a ping.
    #[must_use]
    pub fn is_heartbeat(&self, raw: &str) -> bool {
        self.codec.is_heartbeat(raw.as_bytes())
    }

    /// Echo a ping back byte-for-byte.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn echo(&self, sink: &mut dyn FrameSink, raw: &str) -> Result<(), TransportError> {
        sink.write_message(TransportMessage::Text(raw.to_owned()))
            .await?;
        metrics::record_heartbeat();
        tracing::trace!(ping = raw, "Heartbeat echoed");
        Ok(())
    }
}
