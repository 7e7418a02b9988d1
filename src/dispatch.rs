use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::domain::Dispatched;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch queue closed; execution stage is gone")]
    Closed,
}

/// Result of offering a pair to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    Dropped,
}

/// Bounded FIFO between discovery and execution.
pub struct DispatchQueue;

impl DispatchQueue {
    pub fn new(capacity: usize) -> (DispatchSender, DispatchReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let sender = DispatchSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sender, DispatchReceiver { rx })
    }
}

#[derive(Clone)]
pub struct DispatchSender {
    tx: mpsc::Sender<Dispatched>,
    dropped: Arc<AtomicU64>,
}

impl DispatchSender {
    /// Never waits: a full buffer drops the pair.
    pub fn offer(&self, item: Dispatched) -> Result<Offer, DispatchError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(Offer::Queued),
            Err(TrySendError::Full(item)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    address = %item.pair.address,
                    symbol = %item.pair.label(),
                    dropped_total = total,
                    "dispatch.queue_full"
                );
                Ok(Offer::Dropped)
            }
            Err(TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct DispatchReceiver {
    rx: mpsc::Receiver<Dispatched>,
}

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<Dispatched> {
        self.rx.recv().await
    }

    /// Stop accepting new items; buffered ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GateDecision;
    use crate::providers::fake::pair;

    fn item(n: usize) -> Dispatched {
        Dispatched {
            pair: pair(&format!("P{n}"), "TOK"),
            decision: GateDecision::from_reasons(vec![], 1.0),
        }
    }

    #[tokio::test]
    async fn overflow_is_dropped_and_counted() {
        let (tx, mut rx) = DispatchQueue::new(100);
        for n in 0..100 {
            assert_eq!(tx.offer(item(n)), Ok(Offer::Queued));
        }
        assert_eq!(tx.offer(item(100)), Ok(Offer::Dropped));
        assert_eq!(tx.len(), 100);
        assert_eq!(tx.dropped(), 1);

        // FIFO
        assert_eq!(rx.recv().await.unwrap().pair.address, "P0");
        assert_eq!(tx.len(), 99);
    }

    #[tokio::test]
    async fn closed_queue_is_an_error() {
        let (tx, rx) = DispatchQueue::new(1);
        drop(rx);
        assert_eq!(tx.offer(item(0)), Err(DispatchError::Closed));
    }
}
