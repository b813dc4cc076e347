use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Frame, MessageError};

/// Largest block a `piece` frame may carry.
pub const MAX_BLOCK_LENGTH: u32 = 1 << 20;

// A piece frame is the id, index and begin (9 bytes) plus the block; the
// extra headroom also fits the bitfield of a very large torrent.
pub const MAX_FRAME_LENGTH: usize = MAX_BLOCK_LENGTH as usize + 13;

const LENGTH_PREFIX: usize = 4;

/// Length-prefixed framing for peer wire messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Frame;

    type Error = MessageError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(length) = peek_length(src) else {
            return Ok(None);
        };

        if length == 0 {
            src.advance(LENGTH_PREFIX);
            return Ok(Some(Frame::KeepAlive));
        }

        if length > MAX_FRAME_LENGTH {
            return Err(MessageError::FrameTooLarge(length));
        }

        // Not full frame is received, wait for more
        if src.len() < LENGTH_PREFIX + length {
            src.reserve(LENGTH_PREFIX + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let id = src.get_u8();
        let payload = src.split_to(length - 1).to_vec();

        Ok(Some(Frame::from_parts(id, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let expected = peek_length(src).map_or(LENGTH_PREFIX, |length| LENGTH_PREFIX + length);
        Err(MessageError::Truncated {
            expected,
            received: src.len(),
        })
    }
}

impl Encoder<Frame> for MessageCodec {
    type Error = MessageError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(&item, dst);
        Ok(())
    }
}

fn peek_length(src: &BytesMut) -> Option<usize> {
    if src.len() < LENGTH_PREFIX {
        return None;
    }
    Some(u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize)
}

pub(crate) fn write_frame(frame: &Frame, dst: &mut BytesMut) {
    match frame {
        Frame::KeepAlive => dst.put_u32(0),
        Frame::Message(message) => put_message(message.id as u8, &message.payload, dst),
        Frame::Unknown { id, payload } => put_message(*id, payload, dst),
    }
}

fn put_message(id: u8, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(LENGTH_PREFIX + 1 + payload.len());
    dst.put_u32(1 + payload.len() as u32);
    dst.put_u8(id);
    dst.put_slice(payload);
}
