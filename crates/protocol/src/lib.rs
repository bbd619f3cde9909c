//! AudioSocket wire framing
//!
//! The telephony gateway streams call audio over a persistent TCP connection
//! using `[type:1][length:2 BE][payload]` messages:
//!
//! - `0x00` hangup, empty payload, either direction
//! - `0x01` handshake, 16-byte session identifier
//! - `0x10` audio, fixed 640-byte PCM payload (20 ms)
//!
//! Reads are not aligned to message boundaries; [`FrameDecoder`] reassembles
//! partial headers and payloads across reads. Unknown type codes are skipped,
//! not fatal. Outbound audio uses the same framing, fed through a bounded
//! [`OutboundQueue`] with a drop-oldest policy.

pub mod codec;
pub mod frame;
pub mod outbound;

pub use codec::FrameDecoder;
pub use frame::{Frame, FrameType, MAX_PAYLOAD_LEN};
pub use outbound::OutboundQueue;

use thiserror::Error;

/// Protocol errors. Any of these drops the connection before or without a
/// session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("expected handshake, got {0:#04x}")]
    UnexpectedFrame(u8),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}
