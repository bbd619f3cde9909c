//! Incremental frame decoder
//!
//! Stream reads are not aligned to message boundaries, so the decoder
//! accumulates bytes and yields complete frames as they become available.

use uuid::Uuid;

use call_agent_core::FRAME_BYTES;

use crate::frame::{Frame, FrameType, HANDSHAKE_LEN, MAX_PAYLOAD_LEN};
use crate::ProtocolError;

const HEADER_LEN: usize = 3;

/// Reassembles frames from an unaligned byte stream.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the connection.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// Unknown type codes are consumed and skipped. Length violations for
    /// known types, or any declared length above [`MAX_PAYLOAD_LEN`], are
    /// malformed and fatal to the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }

            let type_byte = self.buf[0];
            let declared = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
            if declared > MAX_PAYLOAD_LEN {
                return Err(ProtocolError::Malformed(format!(
                    "declared payload length {declared} exceeds limit"
                )));
            }
            if self.buf.len() < HEADER_LEN + declared {
                return Ok(None);
            }

            let payload: Vec<u8> = self.buf[HEADER_LEN..HEADER_LEN + declared].to_vec();
            self.buf.drain(..HEADER_LEN + declared);

            match FrameType::from_u8(type_byte) {
                Some(FrameType::Hangup) => {
                    if !payload.is_empty() {
                        return Err(ProtocolError::Malformed(format!(
                            "hangup frame with {} payload bytes",
                            payload.len()
                        )));
                    }
                    return Ok(Some(Frame::Hangup));
                }
                Some(FrameType::Handshake) => {
                    if payload.len() != HANDSHAKE_LEN {
                        return Err(ProtocolError::Malformed(format!(
                            "handshake payload must be {HANDSHAKE_LEN} bytes, got {}",
                            payload.len()
                        )));
                    }
                    let mut id = [0u8; HANDSHAKE_LEN];
                    id.copy_from_slice(&payload);
                    return Ok(Some(Frame::Handshake {
                        session_id: Uuid::from_bytes(id),
                    }));
                }
                Some(FrameType::Audio) => {
                    if payload.len() != FRAME_BYTES {
                        return Err(ProtocolError::Malformed(format!(
                            "audio payload must be {FRAME_BYTES} bytes, got {}",
                            payload.len()
                        )));
                    }
                    return Ok(Some(Frame::Audio { payload }));
                }
                None => {
                    tracing::trace!(type_byte, len = declared, "skipping unknown frame type");
                    continue;
                }
            }
        }
    }

    /// Bytes currently buffered, for diagnostics.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
