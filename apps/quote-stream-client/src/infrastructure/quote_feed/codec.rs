//! Frame Codec
//!
//! Encodes outgoing envelopes and splits incoming messages into payloads.
//!
//! # Wire Format
//!
//! Every envelope travels as `~m~<len>~m~<json>`, where `<len>` is the
//! decimal byte length of `<json>`. One transport message may carry several
//! frames back to back:
//!
//! ```text
//! ~m~33~m~{"m":"quote_completed","p":["x"]}~m~4~m~~h~1
//! ```
//!
//! A heartbeat is a frame whose payload starts with `~`, e.g. `~m~4~m~~h~7`.

use serde::Serialize;
use serde_json::json;

use super::messages::{Command, Envelope};

/// Marker surrounding the length token of every frame.
pub const FRAME_MARKER: &str = "~m~";

const MARKER: &[u8] = FRAME_MARKER.as_bytes();
const HEARTBEAT_PREFIX: u8 = b'~';
const MAX_LENGTH_DIGITS: usize = 20;

/// Errors raised while splitting a raw message into frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// Expected `~m~` but found something else.
    #[error("missing frame marker at offset {offset}")]
    MissingMarker {
        /// Byte offset where the marker was expected.
        offset: usize,
    },

    /// Length token is not a non-negative decimal integer.
    #[error("invalid frame length {token:?} at offset {offset}")]
    InvalidLength {
        /// Byte offset of the token.
        offset: usize,
        /// The offending token.
        token: String,
    },

    /// Declared payload length runs past the end of the message.
    #[error("frame at offset {offset} declares {declared} bytes but only {remaining} remain")]
    Truncated {
        /// Byte offset of the payload.
        offset: usize,
        /// Declared payload length.
        declared: usize,
        /// Bytes left in the message.
        remaining: usize,
    },
}

/// Position of one frame's payload inside a raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    payload_start: usize,
    declared_len: usize,
}

/// Codec for the `~m~` framed envelope protocol.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Serialize an envelope and wrap it in a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized to JSON.
    pub fn encode<P: Serialize>(&self, name: &str, payload: &P) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(&Envelope::new(name, payload))?;
        Ok(self.wrap(&json))
    }

    /// Frame a client command.
    #[must_use]
    pub fn encode_command(&self, command: &Command<'_>) -> String {
        let envelope = json!({ "m": command.name(), "p": command.payload() });
        self.wrap(&envelope.to_string())
    }

    /// Wrap an already serialized payload in a frame.
    #[must_use]
    pub fn wrap(&self, json: &str) -> String {
        format!("{FRAME_MARKER}{}{FRAME_MARKER}{json}", json.len())
    }

    /// Split a raw message into its frame payloads, in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`FramingError`] encountered. Nothing after a bad
    /// frame can be trusted, so no partial result is returned.
    pub fn split_frames<'a>(&self, raw: &'a [u8]) -> Result<Vec<&'a [u8]>, FramingError> {
        Frames::new(raw).collect()
    }

    /// Iterate lazily over the frame payloads of a raw message.
    #[must_use]
    pub fn frames<'a>(&self, raw: &'a [u8]) -> Frames<'a> {
        Frames::new(raw)
    }

    /// Check whether a raw message is a keep-alive ping.
    ///
    /// Malformed input is never a heartbeat.
    #[must_use]
    pub fn is_heartbeat(&self, raw: &[u8]) -> bool {
        parse_header(raw, 0)
            .ok()
            .and_then(|header| raw.get(header.payload_start))
            .is_some_and(|&byte| byte == HEARTBEAT_PREFIX)
    }
}

/// Iterator over the frame payloads of one raw message.
///
/// Yields at most one error, then stops.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    raw: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Frames<'a> {
    const fn new(raw: &'a [u8]) -> Self {
        Self {
            raw,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<&'a [u8], FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.raw.len() {
            return None;
        }

        let header = match parse_header(self.raw, self.offset) {
            Ok(header) => header,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let remaining = self.raw.len() - header.payload_start;
        if header.declared_len > remaining {
            self.failed = true;
            return Some(Err(FramingError::Truncated {
                offset: header.payload_start,
                declared: header.declared_len,
                remaining,
            }));
        }

        let end = header.payload_start + header.declared_len;
        self.offset = end;
        Some(Ok(&self.raw[header.payload_start..end]))
    }
}

/// Parse `~m~<digits>~m~` starting at `offset`.
fn parse_header(raw: &[u8], offset: usize) -> Result<FrameHeader, FramingError> {
    let rest = &raw[offset.min(raw.len())..];
    if !rest.starts_with(MARKER) {
        return Err(FramingError::MissingMarker { offset });
    }

    let token_start = offset + MARKER.len();
    let token_len = raw[token_start..]
        .iter()
        .position(|&b| b == b'~')
        .ok_or_else(|| FramingError::InvalidLength {
            offset: token_start,
            token: String::from_utf8_lossy(&raw[token_start..]).into_owned(),
        })?;
    let token = &raw[token_start..token_start + token_len];

    let declared_len = parse_length(token).ok_or_else(|| FramingError::InvalidLength {
        offset: token_start,
        token: String::from_utf8_lossy(token).into_owned(),
    })?;

    let closing = token_start + token_len;
    if !raw[closing..].starts_with(MARKER) {
        return Err(FramingError::MissingMarker { offset: closing });
    }

    Ok(FrameHeader {
        payload_start: closing + MARKER.len(),
        declared_len,
    })
}

fn parse_length(token: &[u8]) -> Option<usize> {
    if token.is_empty() || token.len() > MAX_LENGTH_DIGITS || !token.iter().all(u8::is_ascii_digit)
    {
        return None;
    }
    std::str::from_utf8(token).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    use crate::infrastructure::quote_feed::messages::IncomingEnvelope;

    #[test]
    fn encode_wraps_json_with_byte_length() {
        let codec = FrameCodec::new();
        let frame = codec
            .encode("set_auth_token", &["unauthorized_user_token"])
            .unwrap();

        let json = r#"{"m":"set_auth_token","p":["unauthorized_user_token"]}"#;
        assert_eq!(frame, format!("~m~{}~m~{json}", json.len()));
    }

    #[test]
    fn encode_counts_bytes_not_chars() {
        let codec = FrameCodec::new();
        let frame = codec.encode("n", &["é"]).unwrap();
        let json = r#"{"m":"n","p":["é"]}"#;
        assert_eq!(json.len(), json.chars().count() + 1);
        assert_eq!(frame, format!("~m~{}~m~{json}", json.len()));
    }

    #[test]
    fn encode_command_matches_generic_encode() {
        let codec = FrameCodec::new();
        let cmd = Command::SetAuthToken {
            token: "unauthorized_user_token",
        };
        assert_eq!(
            codec.encode_command(&cmd),
            codec.encode(cmd.name(), &cmd.payload()).unwrap()
        );
    }

    #[test]
    fn split_single_frame_round_trips() {
        let codec = FrameCodec::new();
        let frame = codec
            .encode("quote_add_symbols", &serde_json::json!(["qs_x", "FX:EURUSD"]))
            .unwrap();

        let payloads = codec.split_frames(frame.as_bytes()).unwrap();
        assert_eq!(payloads.len(), 1);

        let envelope: IncomingEnvelope = serde_json::from_slice(payloads[0]).unwrap();
        assert_eq!(envelope.name, "quote_add_symbols");
        assert_eq!(
            envelope.payload,
            Some(serde_json::json!(["qs_x", "FX:EURUSD"]))
        );
    }

    #[test]
    fn split_multiple_frames_in_order() {
        let raw = "~m~3~m~abc~m~0~m~~m~5~m~hello";
        let payloads = FrameCodec::new().split_frames(raw.as_bytes()).unwrap();
        assert_eq!(payloads, vec![&b"abc"[..], &b""[..], &b"hello"[..]]);
    }

    #[test]
    fn split_empty_message_yields_nothing() {
        let payloads = FrameCodec::new().split_frames(b"").unwrap();
        assert!(payloads.is_empty());
    }

    #[test_case("~m~abc~m~x" ; "alphabetic")]
    #[test_case("~m~-1~m~x" ; "negative")]
    #[test_case("~m~+1~m~x" ; "explicit sign")]
    #[test_case("~m~~m~x" ; "empty token")]
    #[test_case("~m~1.5~m~x" ; "fractional")]
    #[test_case("~m~99999999999999999999999~m~x" ; "overflow")]
    #[test_case("~m~12" ; "unterminated token")]
    fn split_rejects_bad_length_token(raw: &str) {
        let err = FrameCodec::new().split_frames(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, FramingError::InvalidLength { .. }), "{err:?}");
    }

    #[test]
    fn split_rejects_truncated_payload() {
        let err = FrameCodec::new()
            .split_frames(b"~m~10~m~short")
            .unwrap_err();
        assert_eq!(
            err,
            FramingError::Truncated {
                offset: 8,
                declared: 10,
                remaining: 5,
            }
        );
    }

    #[test]
    fn split_rejects_missing_leading_marker() {
        let err = FrameCodec::new().split_frames(b"{\"m\":\"qsd\"}").unwrap_err();
        assert_eq!(err, FramingError::MissingMarker { offset: 0 });
    }

    #[test]
    fn split_rejects_trailing_garbage() {
        let err = FrameCodec::new().split_frames(b"~m~2~m~okjunk").unwrap_err();
        assert_eq!(err, FramingError::MissingMarker { offset: 9 });
    }

    #[test]
    fn split_rejects_half_closing_marker() {
        let err = FrameCodec::new().split_frames(b"~m~2~x~ok").unwrap_err();
        assert_eq!(err, FramingError::MissingMarker { offset: 4 });
    }

    #[test]
    fn frames_iterator_stops_after_error() {
        let codec = FrameCodec::new();
        let mut frames = codec.frames(b"~m~1~m~a~m~x~m~b");
        assert_eq!(frames.next(), Some(Ok(&b"a"[..])));
        assert!(matches!(frames.next(), Some(Err(_))));
        assert_eq!(frames.next(), None);
    }

    #[test_case("~m~4~m~~h~1", true ; "heartbeat")]
    #[test_case("~m~6~m~~h~123", true ; "multi digit heartbeat")]
    #[test_case("~m~2~m~{}", false ; "json payload")]
    #[test_case("~m~0~m~", false ; "empty payload")]
    #[test_case("", false ; "empty message")]
    #[test_case("~m~", false ; "bare marker")]
    #[test_case("~h~1", false ; "unframed")]
    fn heartbeat_detection(raw: &str, expected: bool) {
        assert_eq!(FrameCodec::new().is_heartbeat(raw.as_bytes()), expected);
    }

    proptest! {
        #[test]
        fn concatenated_frames_split_back(payloads in prop::collection::vec(".{0,40}", 0..8)) {
            let codec = FrameCodec::new();
            let raw: String = payloads.iter().map(|p| codec.wrap(p)).collect();

            let split = codec.split_frames(raw.as_bytes()).unwrap();
            prop_assert_eq!(split.len(), payloads.len());
            for (got, want) in split.iter().zip(&payloads) {
                prop_assert_eq!(*got, want.as_bytes());
            }
        }

        #[test]
        fn arbitrary_input_never_panics(raw in prop::collection::vec(any::<u8>(), 0..64)) {
            let codec = FrameCodec::new();
            let _ = codec.split_frames(&raw);
            let _ = codec.is_heartbeat(&raw);
        }

        #[test]
        fn arbitrary_length_token_is_rejected_or_parsed(token in "[^~]{0,12}") {
            let raw = format!("~m~{token}~m~");
            if let Err(err) = FrameCodec::new().split_frames(raw.as_bytes()) {
                let is_framing = matches!(
                    err,
                    FramingError::InvalidLength { .. } | FramingError::Truncated { .. }
                );
                prop_assert!(is_framing);
            }
        }
    }
}
