use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::piece::{PieceWork, WorkQueue};

/// State shared by the coordinator and every peer worker.
///
/// The work queue is the only cross-worker mutable structure; statistics are
/// plain atomic counters.
#[derive(Debug)]
pub struct SharedState {
    pub queue: WorkQueue,
    pub stats: DownloadStats,
}

impl SharedState {
    pub fn new(works: Vec<PieceWork>, shutdown: &CancellationToken) -> Arc<Self> {
        let total_pieces = works.len() as u32;
        Arc::new(Self {
            queue: WorkQueue::new(works, shutdown),
            stats: DownloadStats::new(total_pieces),
        })
    }
}

/// Atomic counters for download statistics.
/// All operations are lock-free.
#[derive(Debug)]
pub struct DownloadStats {
    /// Verified bytes downloaded so far
    downloaded_bytes: AtomicU64,
    /// Number of completed pieces
    pieces_completed: AtomicU64,
    /// Workers currently holding an established connection
    active_peers: AtomicUsize,
    /// Total number of pieces
    total_pieces: u32,
    /// When the download started
    start_time: Instant,
}

impl DownloadStats {
    pub fn new(total_pieces: u32) -> Self {
        Self {
            downloaded_bytes: AtomicU64::new(0),
            pieces_completed: AtomicU64::new(0),
            active_peers: AtomicUsize::new(0),
            total_pieces,
            start_time: Instant::now(),
        }
    }

    pub fn add_downloaded(&self, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_pieces(&self) {
        self.pieces_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_connected(&self) {
        self.active_peers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_disconnected(&self) {
        self.active_peers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::Relaxed)
    }

    pub fn pieces_completed(&self) -> u64 {
        self.pieces_completed.load(Ordering::Relaxed)
    }

    pub fn active_peers(&self) -> usize {
        self.active_peers.load(Ordering::Relaxed)
    }

    pub fn total_pieces(&self) -> u32 {
        self.total_pieces
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_pieces == 0 {
            return 100.0;
        }
        (self.pieces_completed() as f64 / self.total_pieces as f64) * 100.0
    }

    /// Returns download speed in bytes per second.
    pub fn download_speed(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.downloaded_bytes() as f64 / elapsed
    }
}
