use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::message::{BitfieldError, MessageError};

/// Errors that end a peer connection or the piece attempt running on it.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("handshake protocol identifier is empty")]
    EmptyProtocol,

    #[error("expected info hash {expected} but got {actual}")]
    InfoHashMismatch { expected: String, actual: String },

    #[error("expected bitfield as first message but got {0}")]
    MissingBitfield(String),

    #[error("bitfield is {actual} bytes, expected {expected}")]
    BitfieldLength { expected: usize, actual: usize },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Message(#[from] MessageError),

    #[error("protocol error: {0}")]
    Bitfield(#[from] BitfieldError),
}

impl PeerError {
    pub(crate) fn timeout(stage: &'static str, after: Duration) -> Self {
        PeerError::Timeout { stage, after }
    }
}
