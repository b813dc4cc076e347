use std::time::Duration;

use thiserror::Error;

use crate::message::PieceIndex;

/// Reasons a whole download ends without producing the content.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("manifest lists {pieces} pieces but {length} bytes in pieces of {piece_length} need {expected}")]
    InvalidManifest {
        pieces: usize,
        expected: usize,
        length: usize,
        piece_length: usize,
    },

    #[error("no peers to download from")]
    NoPeers,

    #[error("every peer disconnected with {remaining} of {total} pieces missing")]
    PeersExhausted { remaining: u32, total: u32 },

    #[error("piece {index} failed {failures} times")]
    PieceFailed { index: PieceIndex, failures: u32 },

    #[error("no piece completed in {0:?}")]
    Stalled(Duration),

    #[error("download cancelled")]
    Cancelled,
}
