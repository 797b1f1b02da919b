//! Counting-semaphore admission with completion tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

/// Bounds the number of probes in flight and tracks when all of them are done.
///
/// Every [`Ticket`] handed out by [`acquire`](Self::acquire) holds one capacity
/// token and one completion obligation. Dropping the ticket releases the token
/// and then signals completion, so a worker that moves its ticket in cannot
/// leak either one, whatever path it exits by.
pub struct AdmissionController {
    // Never closed, so acquiring a permit cannot fail.
    sem: Arc<Semaphore>,
    limit: usize,
    completed: Arc<AtomicUsize>,
    // Each ticket owns a clone; the channel closes once the last one is gone.
    done_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
}

impl AdmissionController {
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "parallelism limit must be at least 1");
        let (done_tx, done_rx) = mpsc::channel(1);
        AdmissionController {
            sem: Arc::new(Semaphore::new(limit)),
            limit,
            completed: Arc::new(AtomicUsize::new(0)),
            done_tx,
            done_rx,
        }
    }

    /// Wait for a free capacity token. There is no timeout: tokens come back
    /// as running workers finish.
    pub async fn acquire(&self) -> Ticket {
        let permit = self.sem.clone().acquire_owned().await.expect("admission semaphore is never closed");
        Ticket {
            permit: Some(permit),
            completed: self.completed.clone(),
            _done: self.done_tx.clone(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Tickets currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.limit - self.sem.available_permits()
    }

    /// Block until every ticket handed out has been dropped. Returns the number
    /// of completion signals observed.
    pub async fn await_all_complete(self) -> usize {
        let AdmissionController { done_tx, mut done_rx, completed, .. } = self;
        drop(done_tx);
        // Nothing is ever sent; recv resolves to None when all senders are dropped.
        while done_rx.recv().await.is_some() {}
        completed.load(Ordering::Acquire)
    }
}

/// One capacity token plus one completion obligation.
pub struct Ticket {
    permit: Option<OwnedSemaphorePermit>,
    completed: Arc<AtomicUsize>,
    _done: mpsc::Sender<()>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        // release first, then signal
        drop(self.permit.take());
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}
