use tokio::time::timeout;
use tracing::trace;

use super::{BlockInfo, PieceWork};
use crate::client::ClientConfig;
use crate::message::{parse_have, parse_piece, Frame, Message, MessageError, MessageId, PieceIndex};
use crate::peer::{Peer, PeerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
    /// Nothing requested yet.
    Idle,
    /// Some blocks still to be requested.
    Pipelining,
    /// Every block requested, waiting for the rest of the data.
    AwaitingData,
    Complete,
}

/// Download progress of one piece against one peer.
///
/// Created fresh for every attempt and dropped when the attempt ends.
#[derive(Debug)]
pub struct PieceProgress {
    index: PieceIndex,
    buf: Vec<u8>,
    downloaded: usize,
    requested: usize,
    backlog: usize,
}

impl PieceProgress {
    pub fn new(work: &PieceWork) -> Self {
        Self {
            index: work.index,
            buf: vec![0; work.length],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    pub fn state(&self) -> PieceState {
        if self.is_complete() {
            PieceState::Complete
        } else if self.requested == 0 {
            PieceState::Idle
        } else if self.requested < self.buf.len() {
            PieceState::Pipelining
        } else {
            PieceState::AwaitingData
        }
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded >= self.buf.len()
    }

    pub fn downloaded(&self) -> usize {
        self.downloaded
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn backlog(&self) -> usize {
        self.backlog
    }

    /// Next block to request, or `None` when the pipeline is full or the
    /// whole piece has been requested.
    pub fn next_block(&mut self, max_backlog: usize, max_block_size: u32) -> Option<BlockInfo> {
        if self.backlog >= max_backlog || self.requested >= self.buf.len() {
            return None;
        }

        let length = (self.buf.len() - self.requested).min(max_block_size as usize);
        let block = BlockInfo {
            piece_index: self.index,
            offset: self.requested as u32,
            length: length as u32,
        };

        self.backlog += 1;
        self.requested += length;
        Some(block)
    }

    /// Copies a `piece` message into the buffer and retires one request.
    pub fn record_block(&mut self, message: &Message) -> Result<usize, MessageError> {
        let written = parse_piece(self.index, &mut self.buf, message)?;
        self.downloaded += written;
        self.backlog = self.backlog.saturating_sub(1);
        Ok(written)
    }

    /// Applies one incoming frame. Choke state and `have` updates go to the
    /// peer; anything not relevant here is ignored.
    pub fn handle(&mut self, peer: &mut Peer, frame: Frame) -> Result<(), PeerError> {
        let message = match frame {
            Frame::Message(message) => message,
            Frame::KeepAlive | Frame::Unknown { .. } => return Ok(()),
        };

        match message.id {
            MessageId::Unchoke => peer.unchoke(),
            MessageId::Choke => peer.choke(),
            MessageId::Have => {
                let index = parse_have(&message)?;
                peer.bitfield_mut().set_piece(index)?;
            }
            MessageId::Piece => {
                self.record_block(&message)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn into_data(self) -> Vec<u8> {
        self.buf
    }
}

/// Fetches one piece from `peer` with pipelined block requests, bounded by
/// the whole-piece deadline. The returned buffer is not yet verified.
pub async fn download_piece(
    peer: &mut Peer,
    work: &PieceWork,
    config: &ClientConfig,
) -> Result<Vec<u8>, PeerError> {
    timeout(config.piece_timeout, drive(peer, work, config))
        .await
        .map_err(|_| PeerError::timeout("piece download", config.piece_timeout))?
}

async fn drive(
    peer: &mut Peer,
    work: &PieceWork,
    config: &ClientConfig,
) -> Result<Vec<u8>, PeerError> {
    let mut progress = PieceProgress::new(work);

    while !progress.is_complete() {
        if !peer.is_choked() {
            while let Some(block) = progress.next_block(config.max_backlog, config.max_block_size)
            {
                peer.send_request(block.piece_index, block.offset, block.length)
                    .await?;
            }
        }

        let frame = peer.read().await?;
        trace!(piece = work.index, %frame, state = ?progress.state(), "Received frame");
        progress.handle(peer, frame)?;
    }

    Ok(progress.into_data())
}
