use std::path::PathBuf;
use std::time::Duration;

use crate::message::codec::MAX_BLOCK_LENGTH;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory where downloaded files will be saved
    pub download_path: PathBuf,
    /// Port reported to the tracker
    pub listen_port: u16,
    /// Maximum number of peer workers running at once
    pub max_peers: usize,
    /// Number of pipelined block requests per peer (improves throughput)
    pub max_backlog: usize,
    /// Largest block requested in one message
    pub max_block_size: u32,
    /// Timeout for establishing the TCP connection
    pub connect_timeout: Duration,
    /// Timeout for the peer's handshake response
    pub handshake_timeout: Duration,
    /// Timeout for the peer's initial bitfield
    pub bitfield_timeout: Duration,
    /// Timeout for downloading one whole piece
    pub piece_timeout: Duration,
    /// Failed attempts on a single piece before the download gives up, 0 for no limit
    pub max_piece_failures: u32,
    /// Give up when no piece completes for this long
    pub stall_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("."),
            listen_port: 6881,
            max_peers: 50,
            max_backlog: 5,
            max_block_size: 16384,
            connect_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            piece_timeout: Duration::from_secs(30),
            max_piece_failures: 16,
            stall_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl ClientConfig {
    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = path.into();
        self
    }

    pub fn with_max_peers(mut self, max: usize) -> Self {
        self.max_peers = max;
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_max_backlog(mut self, backlog: usize) -> Self {
        self.max_backlog = backlog;
        self
    }

    /// Clamped to `1..=MAX_BLOCK_LENGTH` so every answer fits in one frame.
    pub fn with_max_block_size(mut self, size: u32) -> Self {
        self.max_block_size = size.clamp(1, MAX_BLOCK_LENGTH);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_bitfield_timeout(mut self, timeout: Duration) -> Self {
        self.bitfield_timeout = timeout;
        self
    }

    pub fn with_piece_timeout(mut self, timeout: Duration) -> Self {
        self.piece_timeout = timeout;
        self
    }

    pub fn with_max_piece_failures(mut self, failures: u32) -> Self {
        self.max_piece_failures = failures;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }
}
