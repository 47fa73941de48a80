//! Session Handshake
//!
//! Establishes a quote session on a freshly opened connection.
//!
//! # Handshake Flow
//!
//! 1. Open the transport (done by the caller)
//! 2. Receive `~m~N~m~{"session_id":"...",...}` from the server
//! 3. Generate the client session identifier `qs_XXXXXXXXXXXX`
//! 4. Send, strictly in order:
//!    - `set_auth_token ["unauthorized_user_token"]`
//!    - `quote_create_session [sid]`
//!    - `quote_set_fields [sid, "lp", "volume", "bid", "ask"]`
//!
//! Every step depends on the previous one succeeding. There is no timeout:
//! a silent server stalls the handshake until the transport gives up.

use rand::Rng;
use serde_json::Value;

use crate::application::ports::{FrameSink, FrameSource, TransportError, TransportMessage};
use crate::domain::session::SessionId;
use crate::infrastructure::metrics;

use super::codec::FrameCodec;
use super::error::HandshakeError;
use super::messages::{Command, ServerHello};

/// Runs the session setup sequence.
#[derive(Debug, Clone)]
pub struct SessionHandshake {
    codec: FrameCodec,
    auth_token: String,
}

impl SessionHandshake {
    /// Create a handshake that authenticates with `auth_token`.
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            codec: FrameCodec::new(),
            auth_token: auth_token.into(),
        }
    }

    /// Run the full handshake and return the new session identifier.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] if the first message cannot be read or
    /// lacks a session context, or if any setup command fails to send.
    pub async fn perform<R>(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        rng: &mut R,
    ) -> Result<SessionId, HandshakeError>
    where
        R: Rng + Send + ?Sized,
    {
        let first = source.read_message().await.map_err(HandshakeError::Read)?;
        let hello = self.parse_server_hello(&first)?;
        tracing::debug!(server_session = ?hello.session_id, "Server hello received");

        let session = SessionId::generate(rng);

        for command in self.setup_commands(&session) {
            send_command(sink, &self.codec, command)
                .await
                .map_err(|source| HandshakeError::Send {
                    command: command.name(),
                    source,
                })?;
        }

        tracing::info!(session = %session, "Quote session established");
        Ok(session)
    }

    /// Validate the first message sent by the server.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Decode`] if the message is not a framed JSON
    /// object and [`HandshakeError::MissingSession`] if it has no non-null
    /// `session_id`.
    pub fn parse_server_hello(&self, message: &TransportMessage) -> Result<ServerHello, HandshakeError> {
        let Some(text) = message.as_text() else {
            return Err(HandshakeError::Decode(
                "expected a text message".to_string(),
            ));
        };

        let payload = self
            .codec
            .frames(text.as_bytes())
            .next()
            .ok_or_else(|| HandshakeError::Decode("message carries no frame".to_string()))?
            .map_err(|e| HandshakeError::Decode(e.to_string()))?;

        let value: Value =
            serde_json::from_slice(payload).map_err(|e| HandshakeError::Decode(e.to_string()))?;
        if !value.is_object() {
            return Err(HandshakeError::Decode(
                "first message is not a JSON object".to_string(),
            ));
        }

        let hello: ServerHello =
            serde_json::from_value(value).map_err(|e| HandshakeError::Decode(e.to_string()))?;
        if !hello.has_session() {
            return Err(HandshakeError::MissingSession);
        }

        Ok(hello)
    }

    /// Setup commands for `session`, in send order.
    #[must_use]
    pub fn setup_commands<'a>(&'a self, session: &'a SessionId) -> [Command<'a>; 3] {
        [
            Command::SetAuthToken {
                token: &self.auth_token,
            },
            Command::CreateSession { session },
            Command::SetFields { session },
        ]
    }
}

/// Frame and write one command.
pub(super) async fn send_command(
    sink: &mut dyn FrameSink,
    codec: &FrameCodec,
    command: Command<'_>,
) -> Result<(), TransportError> {
    let frame = codec.encode_command(&command);
    tracing::debug!(command = command.name(), bytes = frame.len(), "Sending command");

    sink.write_message(TransportMessage::Text(frame)).await?;
    metrics::record_command_sent(command.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use mockall::Sequence;
    use mockall::predicate::function;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::application::ports::MockFrameSink;
    use crate::infrastructure::quote_feed::messages::ANONYMOUS_AUTH_TOKEN;

    struct ScriptedSource(VecDeque<Result<TransportMessage, TransportError>>);

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn read_message(&mut self) -> Result<TransportMessage, TransportError> {
            self.0.pop_front().unwrap_or(Err(TransportError::ConnectionClosed))
        }
    }

    fn source_with(text: &str) -> ScriptedSource {
        ScriptedSource(VecDeque::from([Ok(TransportMessage::Text(text.to_string()))]))
    }

    fn hello() -> String {
        FrameCodec::new().wrap(r#"{"session_id":"abc","timestamp":1700000000}"#)
    }

    fn text_starts_with(prefix: &'static str) -> impl Fn(&TransportMessage) -> bool {
        move |msg| msg.as_text().is_some_and(|t| t.contains(prefix))
    }

    #[tokio::test]
    async fn sends_setup_commands_in_order() {
        let mut sink = MockFrameSink::new();
        let mut seq = Sequence::new();
        for name in [
            r#""m":"set_auth_token""#,
            r#""m":"quote_create_session""#,
            r#""m":"quote_set_fields""#,
        ] {
            sink.expect_write_message()
                .with(function(text_starts_with(name)))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);
        let mut source = source_with(&hello());
        let mut rng = StdRng::seed_from_u64(9);

        let session = handshake
            .perform(&mut source, &mut sink, &mut rng)
            .await
            .unwrap();
        assert!(session.as_str().starts_with("qs_"));
    }

    #[tokio::test]
    async fn aborts_on_first_send_failure() {
        let mut sink = MockFrameSink::new();
        let mut seq = Sequence::new();
        sink.expect_write_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_write_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::Write("broken pipe".to_string())));

        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);
        let mut source = source_with(&hello());
        let mut rng = StdRng::seed_from_u64(9);

        let err = handshake
            .perform(&mut source, &mut sink, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::Send {
                command: "quote_create_session",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn nothing_is_sent_without_session_context() {
        let mut sink = MockFrameSink::new();
        sink.expect_write_message().never();

        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);
        let mut source = source_with(&FrameCodec::new().wrap(r#"{"session_id":null}"#));
        let mut rng = StdRng::seed_from_u64(9);

        let err = handshake
            .perform(&mut source, &mut sink, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::MissingSession));
    }

    #[tokio::test]
    async fn read_failure_is_reported() {
        let mut sink = MockFrameSink::new();
        sink.expect_write_message().never();

        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);
        let mut source = ScriptedSource(VecDeque::new());
        let mut rng = StdRng::seed_from_u64(9);

        let err = handshake
            .perform(&mut source, &mut sink, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::Read(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn hello_must_be_framed_object() {
        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);

        for raw in [
            r#"{"session_id":"abc"}"#.to_string(),
            FrameCodec::new().wrap(r#"["abc"]"#),
            FrameCodec::new().wrap("not json"),
            "~m~99~m~{}".to_string(),
            String::new(),
        ] {
            let err = handshake
                .parse_server_hello(&TransportMessage::Text(raw.clone()))
                .unwrap_err();
            assert!(matches!(err, HandshakeError::Decode(_)), "{raw}: {err:?}");
        }
    }

    #[test]
    fn hello_rejects_binary() {
        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);
        let err = handshake
            .parse_server_hello(&TransportMessage::Binary(vec![1, 2]))
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Decode(_)));
    }

    #[test]
    fn hello_accepts_any_non_null_session() {
        let handshake = SessionHandshake::new(ANONYMOUS_AUTH_TOKEN);
        let msg = TransportMessage::Text(FrameCodec::new().wrap(r#"{"session_id":0}"#));
        assert!(handshake.parse_server_hello(&msg).is_ok());
    }

    #[test]
    fn setup_commands_use_configured_token() {
        let handshake = SessionHandshake::new("custom_token");
        let session = SessionId::generate(&mut StdRng::seed_from_u64(1));
        let [auth, create, fields] = handshake.setup_commands(&session);

        assert_eq!(auth.payload(), serde_json::json!(["custom_token"]));
        assert_eq!(create.name(), "quote_create_session");
        assert_eq!(fields.name(), "quote_set_fields");
    }
}
