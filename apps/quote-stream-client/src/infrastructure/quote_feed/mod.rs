//! Quote Feed Protocol Engine
//!
//! Implements the client side of the multiplexed quote protocol:
//!
//! - **Codec**: `~m~<len>~m~<payload>` framing
//! - **Handshake**: server hello, session identifier, setup commands
//! - **Keep-alive**: ping detection and verbatim echo
//! - **Decoder**: `qsd` pushes into typed quote updates
//! - **Client**: receive loop, per-receive dedup and dispatch

pub mod client;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod heartbeat;
pub mod messages;

pub use client::QuoteClient;
pub use codec::{FRAME_MARKER, FrameCodec, Frames, FramingError};
pub use decoder::{Decoded, QuoteDecoder};
pub use error::{ClientError, ErrorContext, HandshakeError};
pub use handler::{ChannelHandler, FnHandler, QuoteEvent, QuoteHandler};
pub use handshake::SessionHandshake;
pub use heartbeat::KeepAlive;
pub use messages::*;
