//! Dispatch loop: feed -> admission -> one probe task per target.

use crate::config::ProbeConfig;
use crate::handshake::Handshaker;
use crate::probe::probe;
use doqscan_core::{AdmissionController, Recorder, TargetFeed};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Probe tasks spawned.
    pub dispatched: u64,
    /// Completion signals observed before returning.
    pub completed: usize,
    pub reachable: u64,
}

/// Probe every target the feed yields, with at most `admission.limit()`
/// probes in flight, and record reachable addresses.
///
/// Returns only after every spawned probe has finished.
pub async fn scan<R, H>(
    feed: &mut TargetFeed<R>,
    handshaker: Arc<H>,
    config: Arc<ProbeConfig>,
    admission: AdmissionController,
    recorder: Recorder,
) -> ScanSummary
where
    R: AsyncBufRead + Unpin,
    H: Handshaker + ?Sized + 'static,
{
    let reachable = Arc::new(AtomicU64::new(0));
    let mut dispatched = 0u64;

    while let Some(target) = feed.next().await {
        let ticket = admission.acquire().await;
        dispatched += 1;
        trace!(%target, in_flight = admission.in_flight(), "dispatching probe");

        let handshaker = handshaker.clone();
        let config = config.clone();
        let recorder = recorder.clone();
        let reachable = reachable.clone();
        tokio::spawn(async move {
            // Held for the whole task, dropped on every exit path.
            let _ticket = ticket;
            if probe(handshaker.as_ref(), &config, target).await.is_reachable() {
                recorder.record(target.ip());
                reachable.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    drop(recorder);

    let completed = admission.await_all_complete().await;
    ScanSummary { dispatched, completed, reachable: reachable.load(Ordering::Relaxed) }
}
