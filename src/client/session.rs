use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::peer::Handshake;
use crate::piece::{piece_bounds, piece_works};

use super::config::ClientConfig;
use super::error::DownloadError;
use super::peer_worker::{PeerWorker, WorkerEvent};
use super::state::SharedState;

/// Everything needed to fetch one torrent's content.
#[derive(Debug, Clone)]
pub struct TorrentDescriptor {
    pub peers: Vec<SocketAddrV4>,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub piece_hashes: Vec<[u8; 20]>,
    pub piece_length: usize,
    pub length: usize,
    pub name: String,
}

/// Main session coordinator for downloading a torrent.
pub struct TorrentSession {
    descriptor: TorrentDescriptor,
    config: ClientConfig,
}

impl TorrentSession {
    pub fn new(descriptor: TorrentDescriptor, config: ClientConfig) -> Self {
        Self { descriptor, config }
    }

    pub fn descriptor(&self) -> &TorrentDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Downloads every piece and returns the assembled content.
    ///
    /// After each verified piece the completed percentage is sent on
    /// `progress`; a dropped receiver is fine. Cancelling `shutdown` stops
    /// every worker and returns [`DownloadError::Cancelled`].
    #[instrument(skip_all, fields(name = %self.descriptor.name))]
    pub async fn download(
        &self,
        progress: mpsc::UnboundedSender<f64>,
        shutdown: CancellationToken,
    ) -> Result<Vec<u8>, DownloadError> {
        self.validate()?;

        let descriptor = &self.descriptor;
        let total_pieces = descriptor.piece_hashes.len();
        if total_pieces == 0 {
            return Ok(Vec::new());
        }
        if descriptor.peers.is_empty() {
            return Err(DownloadError::NoPeers);
        }

        info!(
            "Starting download of {} ({} pieces, {} peers, info hash {})",
            descriptor.name,
            total_pieces,
            descriptor.peers.len(),
            hex::encode(descriptor.info_hash),
        );

        let works = piece_works(
            &descriptor.piece_hashes,
            descriptor.piece_length,
            descriptor.length,
        );
        let shutdown = shutdown.child_token();
        let state = SharedState::new(works, &shutdown);

        // Capacity 1 keeps workers close to lock step with the coordinator.
        let (result_tx, mut result_rx) = mpsc::channel::<WorkerEvent>(1);

        let semaphore = Arc::new(Semaphore::new(self.config.max_peers.max(1)));
        let handshake = Handshake::new(descriptor.info_hash, descriptor.peer_id);
        let mut workers = JoinSet::new();

        for addr in &descriptor.peers {
            let worker = PeerWorker::new(
                *addr,
                handshake.clone(),
                total_pieces,
                Arc::clone(&state),
                self.config.clone(),
                result_tx.clone(),
                shutdown.clone(),
            );
            let semaphore = Arc::clone(&semaphore);

            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                worker.run().await;
            });
        }

        // Drop our sender so the coordinator sees when every worker is gone
        drop(result_tx);

        let mut buf = vec![0u8; descriptor.length];
        let stats = &state.stats;

        let outcome = loop {
            if stats.pieces_completed() == u64::from(stats.total_pieces()) {
                break Ok(());
            }

            let event = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break Err(DownloadError::Cancelled),
                event = next_event(&mut result_rx, self.config.stall_timeout) => event,
            };

            match event {
                Ok(Some(WorkerEvent::Completed(result))) => {
                    let (begin, end) =
                        piece_bounds(result.index, descriptor.piece_length, descriptor.length);
                    buf[begin..end].copy_from_slice(&result.data);
                    stats.increment_pieces();

                    let percent = stats.progress_percent();
                    debug!(
                        "({:.2}%) Downloaded piece #{}, {}/{} pieces, {} bytes at {:.0} B/s from {} peers",
                        percent,
                        result.index,
                        stats.pieces_completed(),
                        stats.total_pieces(),
                        stats.downloaded_bytes(),
                        stats.download_speed(),
                        stats.active_peers()
                    );
                    let _ = progress.send(percent);
                }
                Ok(Some(WorkerEvent::GaveUp { index, failures })) => {
                    break Err(DownloadError::PieceFailed { index, failures });
                }
                Ok(None) => {
                    break Err(DownloadError::PeersExhausted {
                        remaining: stats.total_pieces() - stats.pieces_completed() as u32,
                        total: stats.total_pieces(),
                    });
                }
                Err(_) => {
                    let after = self.config.stall_timeout.unwrap_or_default();
                    break Err(DownloadError::Stalled(after));
                }
            }
        };

        state.queue.close();
        shutdown.cancel();
        workers.shutdown().await;

        match outcome {
            Ok(()) => {
                info!("Download of {} complete", descriptor.name);
                Ok(buf)
            }
            Err(e) => {
                warn!("Download of {} failed: {}", descriptor.name, e);
                Err(e)
            }
        }
    }

    fn validate(&self) -> Result<(), DownloadError> {
        let descriptor = &self.descriptor;
        let pieces = descriptor.piece_hashes.len();
        let expected = if descriptor.piece_length == 0 {
            usize::MAX
        } else {
            descriptor.length.div_ceil(descriptor.piece_length)
        };

        if pieces != expected {
            return Err(DownloadError::InvalidManifest {
                pieces,
                expected,
                length: descriptor.length,
                piece_length: descriptor.piece_length,
            });
        }
        Ok(())
    }
}

/// Next worker event, or `Elapsed` when none arrives within `stall_timeout`.
async fn next_event(
    rx: &mut mpsc::Receiver<WorkerEvent>,
    stall_timeout: Option<Duration>,
) -> Result<Option<WorkerEvent>, Elapsed> {
    match stall_timeout {
        Some(after) => tokio::time::timeout(after, rx.recv()).await,
        None => Ok(rx.recv().await),
    }
}
