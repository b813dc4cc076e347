use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam::queue::ArrayQueue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::PieceWork;
use crate::message::PieceIndex;

/// Pieces waiting for a worker, shared by every peer task.
///
/// Capacity equals the number of pieces, so pushing back an item a worker
/// took out can never fail or block.
#[derive(Debug)]
pub struct WorkQueue {
    items: ArrayQueue<PieceWork>,
    failures: Vec<AtomicU32>,
    available: Notify,
    closed: CancellationToken,
}

impl WorkQueue {
    /// Fills the queue with `works`. Cancelling `shutdown` closes it.
    pub fn new(works: Vec<PieceWork>, shutdown: &CancellationToken) -> Self {
        let items = ArrayQueue::new(works.len().max(1));
        let failures = works.iter().map(|_| AtomicU32::new(0)).collect();

        let queue = Self {
            items,
            failures,
            available: Notify::new(),
            closed: shutdown.child_token(),
        };
        for work in works {
            queue.push(work);
        }
        queue
    }

    /// Puts `work` at the back of the queue and wakes one waiting worker.
    pub fn push(&self, work: PieceWork) {
        if let Err(work) = self.items.push(work) {
            error!(piece = work.index, "Work queue is over capacity, dropping piece");
            return;
        }
        self.available.notify_one();
    }

    /// Takes the next piece, waiting while the queue is empty.
    /// Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<PieceWork> {
        loop {
            if self.closed.is_cancelled() {
                return None;
            }

            let notified = self.available.notified();
            if let Some(work) = self.items.pop() {
                // A single stored permit may have stood for several pushes.
                if !self.items.is_empty() {
                    self.available.notify_one();
                }
                return Some(work);
            }

            tokio::select! {
                _ = notified => {}
                _ = self.closed.cancelled() => return None,
            }
        }
    }

    /// Counts one failed attempt at `index` and returns the new total.
    pub fn record_failure(&self, index: PieceIndex) -> u32 {
        match self.failures.get(index as usize) {
            Some(count) => count.fetch_add(1, Ordering::Relaxed) + 1,
            None => 0,
        }
    }

    pub fn failures(&self, index: PieceIndex) -> u32 {
        self.failures
            .get(index as usize)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Pieces currently waiting; in-flight pieces are not counted.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
