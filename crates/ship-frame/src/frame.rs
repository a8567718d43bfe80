use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the frame header: a single message type byte.
pub const HEADER_SIZE: usize = 1;

/// The complete Init frame, sent by the client and echoed by the server.
pub const INIT_FRAME: [u8; 2] = [MessageType::Init as u8, 0x00];

/// The single payload byte of an Init frame.
pub const INIT_PAYLOAD: u8 = 0x00;

/// Leading type byte of every physical SHIP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Connection-mode initialisation (binary, pre-JSON).
    Init = 0,
    /// Handshake control messages.
    Control = 1,
    /// Data envelopes carrying the application payload.
    Data = 2,
    /// Connection close messages.
    End = 3,
}

impl MessageType {
    /// Human-readable name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Init => "INIT",
            MessageType::Control => "CONTROL",
            MessageType::Data => "DATA",
            MessageType::End => "END",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageType::Init),
            1 => Ok(MessageType::Control),
            2 => Ok(MessageType::Data),
            3 => Ok(MessageType::End),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A physical SHIP message split into its type byte and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message type byte.
    pub msg_type: MessageType,
    /// Everything after the type byte.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(msg_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// The Init frame (`[0x00, 0x00]`).
    pub fn init() -> Self {
        Self::new(MessageType::Init, Bytes::from_static(&[INIT_PAYLOAD]))
    }

    /// The total wire size of this frame (type byte + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.msg_type, &self.payload, &mut dst);
        dst.freeze()
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌────────────┬──────────────────────────────┐
/// │ Type (1B)  │ Payload                      │
/// │ 0..=3      │ 0x00 (Init) or JSON body     │
/// └────────────┴──────────────────────────────┘
/// ```
pub fn encode_frame(msg_type: MessageType, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(msg_type as u8);
    dst.put_slice(payload);
}

/// Decode one physical message into a frame.
///
/// Unlike a byte-stream codec there is no partial state: the socket below
/// already delivers discrete messages.
pub fn decode_frame(src: Bytes) -> Result<Frame> {
    let Some(&first) = src.first() else {
        return Err(FrameError::EmptyFrame);
    };
    let msg_type = MessageType::try_from(first)?;
    Ok(Frame {
        msg_type,
        payload: src.slice(HEADER_SIZE..),
    })
}

/// Validate that `src` is exactly the Init frame.
pub fn check_init_frame(src: &[u8]) -> Result<()> {
    if src == INIT_FRAME {
        Ok(())
    } else {
        Err(FrameError::InvalidInitFrame(src.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_control() {
        let mut buf = BytesMut::new();
        encode_frame(MessageType::Control, br#"{"x":1}"#, &mut buf);
        assert_eq!(buf[0], 1);

        let frame = decode_frame(buf.freeze()).unwrap();
        assert_eq!(frame.msg_type, MessageType::Control);
        assert_eq!(frame.payload.as_ref(), br#"{"x":1}"#);
    }

    #[test]
    fn test_init_frame_bytes() {
        let frame = Frame::init();
        assert_eq!(frame.to_bytes().as_ref(), &[0x00, 0x00]);
        assert_eq!(frame.wire_size(), 2);
        assert!(check_init_frame(&frame.to_bytes()).is_ok());
    }

    #[test]
    fn test_check_init_frame_rejects_mismatch() {
        assert!(matches!(
            check_init_frame(&[0x00, 0x01]),
            Err(FrameError::InvalidInitFrame(_))
        ));
        assert!(matches!(
            check_init_frame(&[0x00]),
            Err(FrameError::InvalidInitFrame(_))
        ));
    }

    #[test]
    fn test_decode_empty_frame() {
        let result = decode_frame(Bytes::new());
        assert!(matches!(result, Err(FrameError::EmptyFrame)));
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode_frame(Bytes::from_static(&[7, b'{', b'}']));
        assert!(matches!(result, Err(FrameError::UnknownMessageType(7))));
    }

    #[test]
    fn test_end_type_is_distinct_from_control() {
        assert_eq!(MessageType::End as u8, 3);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::End);
        assert_ne!(MessageType::End, MessageType::Control);
    }

    #[test]
    fn test_type_only_frame_has_empty_payload() {
        let frame = decode_frame(Bytes::from_static(&[2])).unwrap();
        assert_eq!(frame.msg_type, MessageType::Data);
        assert!(frame.payload.is_empty());
    }
}
