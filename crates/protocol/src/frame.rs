//! Frame types and encoding

use uuid::Uuid;

use call_agent_core::FRAME_BYTES;

use crate::ProtocolError;

/// Hard ceiling on declared payload length, applied even to unknown type
/// codes so a bogus header cannot make the decoder buffer unbounded data.
pub const MAX_PAYLOAD_LEN: usize = 8 * 1024;

/// Handshake payload length: a 16-byte session identifier.
pub const HANDSHAKE_LEN: usize = 16;

/// Wire type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Hangup = 0x00,
    Handshake = 0x01,
    Audio = 0x10,
}

impl FrameType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(FrameType::Hangup),
            0x01 => Some(FrameType::Handshake),
            0x10 => Some(FrameType::Audio),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Call hangup, either direction
    Hangup,
    /// Session identifier presented by the gateway
    Handshake { session_id: Uuid },
    /// One fixed-size PCM16 audio payload
    Audio { payload: Vec<u8> },
}

impl Frame {
    /// Build an audio frame, enforcing the fixed payload size.
    pub fn audio(payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() != FRAME_BYTES {
            return Err(ProtocolError::Malformed(format!(
                "audio payload must be {} bytes, got {}",
                FRAME_BYTES,
                payload.len()
            )));
        }
        Ok(Frame::Audio { payload })
    }

    pub fn handshake(session_id: Uuid) -> Self {
        Frame::Handshake { session_id }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Hangup => FrameType::Hangup,
            Frame::Handshake { .. } => FrameType::Handshake,
            Frame::Audio { .. } => FrameType::Audio,
        }
    }

    /// Encode into the wire form: `[type:1][length:2 BE][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let payload: &[u8] = match self {
            Frame::Hangup => &[],
            Frame::Handshake { session_id } => session_id.as_bytes(),
            Frame::Audio { payload } => payload,
        };
        let mut out = Vec::with_capacity(3 + payload.len());
        out.push(self.frame_type().as_u8());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_hangup() {
        assert_eq!(Frame::Hangup.encode(), vec![0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_handshake() {
        let id = Uuid::new_v4();
        let bytes = Frame::handshake(id).encode();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(u16::from_be_bytes([bytes[1], bytes[2]]), 16);
        assert_eq!(&bytes[3..], id.as_bytes());
    }

    #[test]
    fn test_encode_audio() {
        let frame = Frame::audio(vec![0u8; FRAME_BYTES]).unwrap();
        let bytes = frame.encode();
        assert_eq!(bytes[0], 0x10);
        assert_eq!(
            u16::from_be_bytes([bytes[1], bytes[2]]) as usize,
            FRAME_BYTES
        );
        assert_eq!(bytes.len(), 3 + FRAME_BYTES);
    }

    #[test]
    fn test_audio_size_enforced() {
        assert!(Frame::audio(vec![0u8; FRAME_BYTES - 1]).is_err());
        assert!(Frame::audio(vec![0u8; FRAME_BYTES + 1]).is_err());
    }
}
