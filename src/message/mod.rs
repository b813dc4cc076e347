use std::fmt;
use std::io;

mod bitfield;
pub mod codec;

pub use bitfield::{Bitfield, BitfieldError};
pub use codec::MessageCodec;

pub type PieceIndex = u32;

/// Message kinds of the vanilla peer wire protocol.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        let id = match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => return Err(other),
        };
        Ok(id)
    }
}

/// A message kind plus its raw payload, as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    /// A message without payload (choke, unchoke, interested, not interested).
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(id: MessageId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn serialize(&self) -> Vec<u8> {
        Frame::Message(self.clone()).serialize()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [{}]", self.id, self.payload.len())
    }
}

/// One decoded unit of the stream.
///
/// Ids outside the nine known kinds are kept as `Unknown` so the caller can
/// ignore them instead of tearing down the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    KeepAlive,
    Message(Message),
    Unknown { id: u8, payload: Vec<u8> },
}

impl Frame {
    pub(crate) fn from_parts(id: u8, payload: Vec<u8>) -> Self {
        match MessageId::try_from(id) {
            Ok(id) => Frame::Message(Message { id, payload }),
            Err(id) => Frame::Unknown { id, payload },
        }
    }

    /// Encodes the frame; a keep-alive becomes four zero bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = tokio_util::bytes::BytesMut::new();
        codec::write_frame(self, &mut buf);
        buf.to_vec()
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Frame::Message(message)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::KeepAlive => f.write_str("KeepAlive"),
            Frame::Message(message) => message.fmt(f),
            Frame::Unknown { id, payload } => write!(f, "Unknown#{} [{}]", id, payload.len()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("stream ended after {received} of {expected} frame bytes")]
    Truncated { expected: usize, received: usize },

    #[error("frame length {0} exceeds maximum allowed size")]
    FrameTooLarge(usize),

    #[error("expected {expected:?} message but got {actual:?}")]
    UnexpectedId {
        expected: MessageId,
        actual: MessageId,
    },

    #[error("{id:?} payload has invalid length {length}")]
    PayloadLength { id: MessageId, length: usize },

    #[error("expected piece index {expected} but got {actual}")]
    PieceIndexMismatch {
        expected: PieceIndex,
        actual: PieceIndex,
    },

    #[error("block offset {begin} is too large for buffer length {buffer}")]
    OffsetOutOfRange { begin: usize, buffer: usize },

    #[error("block of {length} bytes at offset {begin} overruns buffer length {buffer}")]
    BlockOverrun {
        begin: usize,
        length: usize,
        buffer: usize,
    },
}

/// `request` for `length` bytes at `begin` within piece `index`.
pub fn format_request(index: PieceIndex, begin: u32, length: u32) -> Message {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&begin.to_be_bytes());
    payload.extend_from_slice(&length.to_be_bytes());
    Message::with_payload(MessageId::Request, payload)
}

pub fn format_have(index: PieceIndex) -> Message {
    Message::with_payload(MessageId::Have, index.to_be_bytes().to_vec())
}

pub fn parse_have(message: &Message) -> Result<PieceIndex, MessageError> {
    expect_id(message, MessageId::Have)?;

    let payload: [u8; 4] =
        message
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| MessageError::PayloadLength {
                id: MessageId::Have,
                length: message.payload.len(),
            })?;

    Ok(u32::from_be_bytes(payload))
}

/// Copies the block carried by a `piece` message into `buf` at its `begin`
/// offset and returns the number of bytes written.
pub fn parse_piece(
    index: PieceIndex,
    buf: &mut [u8],
    message: &Message,
) -> Result<usize, MessageError> {
    expect_id(message, MessageId::Piece)?;

    let payload = &message.payload;
    if payload.len() < 8 {
        return Err(MessageError::PayloadLength {
            id: MessageId::Piece,
            length: payload.len(),
        });
    }

    let parsed_index = read_u32(&payload[0..4]);
    if parsed_index != index {
        return Err(MessageError::PieceIndexMismatch {
            expected: index,
            actual: parsed_index,
        });
    }

    let begin = read_u32(&payload[4..8]) as usize;
    if begin >= buf.len() {
        return Err(MessageError::OffsetOutOfRange {
            begin,
            buffer: buf.len(),
        });
    }

    let data = &payload[8..];
    if begin + data.len() > buf.len() {
        return Err(MessageError::BlockOverrun {
            begin,
            length: data.len(),
            buffer: buf.len(),
        });
    }

    buf[begin..begin + data.len()].copy_from_slice(data);
    Ok(data.len())
}

fn expect_id(message: &Message, expected: MessageId) -> Result<(), MessageError> {
    if message.id != expected {
        return Err(MessageError::UnexpectedId {
            expected,
            actual: message.id,
        });
    }
    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece_message(index: u32, begin: u32, data: &[u8]) -> Message {
        let mut payload = Vec::new();
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(data);
        Message::with_payload(MessageId::Piece, payload)
    }

    #[test]
    fn test_format_request() {
        let message = format_request(4, 567, 4321);
        assert_eq!(message.id, MessageId::Request);
        assert_eq!(
            message.payload,
            vec![0, 0, 0, 4, 0, 0, 0x02, 0x37, 0, 0, 0x10, 0xE1]
        );
    }

    #[test]
    fn test_format_have() {
        let message = format_have(4);
        assert_eq!(message.id, MessageId::Have);
        assert_eq!(message.payload, vec![0, 0, 0, 4]);
    }

    #[test]
    fn test_parse_have() {
        let message = Message::with_payload(MessageId::Have, vec![0, 0, 0x01, 0x02]);
        assert_eq!(parse_have(&message).unwrap(), 258);
    }

    #[test]
    fn test_parse_have_rejects_wrong_length() {
        for payload in [vec![], vec![0, 0, 1], vec![0, 0, 0, 1, 0]] {
            let message = Message::with_payload(MessageId::Have, payload);
            assert!(matches!(
                parse_have(&message),
                Err(MessageError::PayloadLength { .. })
            ));
        }
    }

    #[test]
    fn test_parse_have_rejects_wrong_id() {
        let message = Message::with_payload(MessageId::Piece, vec![0, 0, 0, 4]);
        assert!(matches!(
            parse_have(&message),
            Err(MessageError::UnexpectedId { .. })
        ));
    }

    #[test]
    fn test_parse_piece() {
        let mut buf = vec![0u8; 10];
        let message = piece_message(4, 2, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        let written = parse_piece(4, &mut buf, &message).unwrap();

        assert_eq!(written, 6);
        assert_eq!(buf, vec![0, 0, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0, 0]);
    }

    #[test]
    fn test_parse_piece_rejects_short_payload() {
        let mut buf = vec![0u8; 10];
        let message = Message::with_payload(MessageId::Piece, vec![0, 0, 0, 4, 0, 0, 0]);
        assert!(matches!(
            parse_piece(4, &mut buf, &message),
            Err(MessageError::PayloadLength { length: 7, .. })
        ));
    }

    #[test]
    fn test_parse_piece_rejects_wrong_index() {
        let mut buf = vec![0u8; 10];
        let message = piece_message(6, 0, &[1, 2, 3]);
        assert!(matches!(
            parse_piece(4, &mut buf, &message),
            Err(MessageError::PieceIndexMismatch {
                expected: 4,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_parse_piece_rejects_offset_past_end() {
        let mut buf = vec![0u8; 10];
        let message = piece_message(4, 10, &[1]);
        assert!(matches!(
            parse_piece(4, &mut buf, &message),
            Err(MessageError::OffsetOutOfRange { begin: 10, .. })
        ));
    }

    #[test]
    fn test_parse_piece_rejects_overrun() {
        let mut buf = vec![0u8; 10];
        let message = piece_message(4, 8, &[1, 2, 3]);
        assert!(matches!(
            parse_piece(4, &mut buf, &message),
            Err(MessageError::BlockOverrun { .. })
        ));
        assert_eq!(buf, vec![0u8; 10], "buffer must stay untouched");
    }

    #[test]
    fn test_parse_piece_rejects_wrong_id() {
        let mut buf = vec![0u8; 10];
        let message = Message::with_payload(MessageId::Have, vec![0, 0, 0, 4]);
        assert!(parse_piece(4, &mut buf, &message).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Frame::KeepAlive.to_string(), "KeepAlive");
        assert_eq!(format_have(1).to_string(), "Have [4]");
        let unknown = Frame::from_parts(20, vec![1, 2]);
        assert_eq!(unknown.to_string(), "Unknown#20 [2]");
    }
}
