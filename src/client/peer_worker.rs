use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::PieceIndex;
use crate::peer::{Handshake, Peer, PeerError};
use crate::piece::{download_piece, PieceResult, PieceWork};

use super::config::ClientConfig;
use super::state::SharedState;

/// Pause after skipping every queued piece in a row, so a peer that owns
/// none of the remaining pieces does not spin.
const SKIP_BACKOFF: Duration = Duration::from_millis(100);

/// What a worker reports to the coordinator.
#[derive(Debug)]
pub enum WorkerEvent {
    Completed(PieceResult),
    /// A piece used up its failure budget.
    GaveUp { index: PieceIndex, failures: u32 },
}

/// Handles communication with a single peer.
/// Each peer connection runs as its own async task.
pub struct PeerWorker {
    addr: SocketAddrV4,
    handshake: Handshake,
    piece_count: usize,
    state: Arc<SharedState>,
    config: ClientConfig,
    /// Channel for verified pieces
    result_tx: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
}

impl PeerWorker {
    pub fn new(
        addr: SocketAddrV4,
        handshake: Handshake,
        piece_count: usize,
        state: Arc<SharedState>,
        config: ClientConfig,
        result_tx: mpsc::Sender<WorkerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            addr,
            handshake,
            piece_count,
            state,
            config,
            result_tx,
            shutdown,
        }
    }

    /// Connects, then serves pieces from the shared queue until the queue
    /// closes or the peer fails. Connection failures end the worker without
    /// a retry.
    pub async fn run(self) {
        let connect = Peer::connect(self.addr, &self.handshake, self.piece_count, &self.config);
        let mut peer = tokio::select! {
            peer = connect => match peer {
                Ok(peer) => peer,
                Err(e) => {
                    debug!("Could not connect to peer {}: {}", self.addr, e);
                    return;
                }
            },
            _ = self.shutdown.cancelled() => return,
        };

        info!("Completed handshake with peer {}", self.addr);
        self.state.stats.peer_connected();

        match self.serve(&mut peer).await {
            Ok(()) => debug!("Peer {} finished, work queue closed", self.addr),
            Err(e) => warn!("Disconnecting from peer {}: {}", self.addr, e),
        }

        self.state.stats.peer_disconnected();
    }

    async fn serve(&self, peer: &mut Peer) -> Result<(), PeerError> {
        peer.send_interested().await?;

        let mut skipped = 0usize;
        while let Some(work) = self.state.queue.pop().await {
            if !peer.bitfield().has_piece(work.index).unwrap_or(false) {
                self.state.queue.push(work);
                skipped += 1;
                if skipped > self.state.queue.len() {
                    skipped = 0;
                    tokio::time::sleep(SKIP_BACKOFF).await;
                } else {
                    tokio::task::yield_now().await;
                }
                continue;
            }
            skipped = 0;

            let attempt = tokio::select! {
                data = download_piece(peer, &work, &self.config) => data,
                _ = self.shutdown.cancelled() => {
                    self.state.queue.push(work);
                    return Ok(());
                }
            };

            let data = match attempt {
                Ok(data) => data,
                Err(e) => {
                    self.give_back(work).await;
                    return Err(e);
                }
            };

            if !work.verify(&data) {
                warn!(
                    "Piece {} from peer {} failed integrity check",
                    work.index, self.addr
                );
                self.give_back(work).await;
                continue;
            }

            let have = peer.send_have(work.index).await;
            self.state.stats.add_downloaded(data.len() as u64);

            let result = PieceResult {
                index: work.index,
                data,
            };
            if !self.publish(WorkerEvent::Completed(result)).await {
                return Ok(());
            }
            have?;
        }

        Ok(())
    }

    /// Requeues a piece after a failed attempt and reports it once the
    /// failure budget is spent. A budget of 0 never runs out.
    async fn give_back(&self, work: PieceWork) {
        let index = work.index;
        let failures = self.state.queue.record_failure(index);
        self.state.queue.push(work);

        let budget = self.config.max_piece_failures;
        // `record_failure` counts up by one, so only one worker sees the exact budget.
        if budget != 0 && failures == budget {
            self.publish(WorkerEvent::GaveUp { index, failures }).await;
        }
    }

    /// Returns false when the coordinator is gone.
    async fn publish(&self, event: WorkerEvent) -> bool {
        tokio::select! {
            sent = self.result_tx.send(event) => sent.is_ok(),
            _ = self.shutdown.cancelled() => false,
        }
    }
}
