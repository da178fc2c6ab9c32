//! Background scan pipeline.
//!
//! Hosts are queued by address on a bounded channel. An address stays in the
//! pending set from the moment it is queued until its probe result has been
//! applied, so a host is never queued twice or probed twice concurrently by
//! the pipeline. When the channel is full the request is dropped; the
//! periodic checkup will pick the host up again later. A host whose entry
//! is replaced while pending is marked for a rescan, which is queued once
//! the pending scan completes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::hostdb::HostDb;
use crate::types::NetAddress;

/// Result of asking the queue to scan a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    /// Already queued or being probed.
    AlreadyPending,
    /// Queue at capacity; request dropped.
    Full,
    /// Scanner has shut down.
    Closed,
}

/// What happened to a scan once the probe returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Result applied to the entry.
    Applied { success: bool },
    /// Entry was removed before or during the probe.
    Vanished,
    /// Entry was replaced by one with a different public key during the probe.
    Replaced,
}

/// Sending half of the scan queue, owned by [`HostDb`].
#[derive(Debug)]
pub(crate) struct ScanQueue {
    tx: mpsc::Sender<NetAddress>,
    pending: Mutex<Pending>,
}

#[derive(Debug, Default)]
struct Pending {
    /// Queued or being probed.
    addresses: HashSet<NetAddress>,
    /// Pending addresses to queue again once their current scan completes.
    rescan: HashSet<NetAddress>,
}

impl ScanQueue {
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::Receiver<NetAddress>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            pending: Mutex::new(Pending::default()),
        };
        (queue, rx)
    }

    pub(crate) fn enqueue(&self, address: NetAddress) -> EnqueueResult {
        let mut pending = self.pending.lock();
        if pending.addresses.contains(&address) {
            return EnqueueResult::AlreadyPending;
        }
        match self.tx.try_send(address.clone()) {
            Ok(()) => {
                pending.addresses.insert(address);
                EnqueueResult::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueResult::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::Closed,
        }
    }

    /// Mark a pending address for another scan after the current one.
    /// Returns false if the address is not pending.
    pub(crate) fn mark_rescan(&self, address: &NetAddress) -> bool {
        let mut pending = self.pending.lock();
        if !pending.addresses.contains(address) {
            return false;
        }
        pending.rescan.insert(address.clone());
        true
    }

    /// Release an address once its scan has been applied. Returns true if
    /// it was marked for a rescan in the meantime.
    pub(crate) fn finish(&self, address: &NetAddress) -> bool {
        let mut pending = self.pending.lock();
        pending.addresses.remove(address);
        pending.rescan.remove(address)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().addresses.len()
    }
}

/// Receiving half of the scan pipeline. Drive it with [`Scanner::run`].
pub struct Scanner {
    hostdb: Arc<HostDb>,
    rx: mpsc::Receiver<NetAddress>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").finish_non_exhaustive()
    }
}

impl Scanner {
    pub(crate) fn new(hostdb: Arc<HostDb>, rx: mpsc::Receiver<NetAddress>) -> Self {
        Self { hostdb, rx }
    }

    /// Process the scan queue until `shutdown` flips to true or its sender is dropped.
    ///
    /// At most `max_concurrent_scans` probes run at once. Probes already in
    /// flight when shutdown is signalled are allowed to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let config = self.hostdb.config().clone();
        let max_in_flight = config.max_concurrent_scans.max(1);
        let mut checkup = config.checkup_interval().map(checkup_interval);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        debug!(max_in_flight, "host scanner started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("host scanner received shutdown signal");
                        break;
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "scan task failed");
                    }
                }

                _ = next_checkup(&mut checkup) => {
                    let queued = self.hostdb.queue_checkup();
                    trace!(queued, "checkup queued hosts for rescan");
                }

                received = self.rx.recv(), if in_flight.len() < max_in_flight => {
                    let Some(address) = received else {
                        debug!("scan queue closed");
                        break;
                    };
                    let hostdb = Arc::clone(&self.hostdb);
                    in_flight.spawn(async move {
                        let outcome = hostdb.scan_host(&address).await;
                        hostdb.complete_scan(address, outcome);
                    });
                }
            }
        }

        let remaining = in_flight.len();
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scan task failed");
            }
        }
        info!(drained = remaining, "host scanner stopped");
    }
}

fn checkup_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_checkup(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: usize) -> NetAddress {
        NetAddress::new(format!("host{i}.example.com:9982"))
    }

    #[test]
    fn test_enqueue_coalesces_pending() {
        let (queue, _rx) = ScanQueue::new(4);
        assert_eq!(queue.enqueue(addr(1)), EnqueueResult::Queued);
        assert_eq!(queue.enqueue(addr(1)), EnqueueResult::AlreadyPending);
        assert_eq!(queue.pending_len(), 1);

        queue.finish(&addr(1));
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.enqueue(addr(1)), EnqueueResult::Queued);
    }

    #[test]
    fn test_rescan_mark_reported_once() {
        let (queue, _rx) = ScanQueue::new(4);
        assert!(!queue.mark_rescan(&addr(1)));

        queue.enqueue(addr(1));
        assert!(queue.mark_rescan(&addr(1)));
        assert!(queue.finish(&addr(1)));
        assert_eq!(queue.pending_len(), 0);

        queue.enqueue(addr(1));
        assert!(!queue.finish(&addr(1)));
    }

    #[test]
    fn test_enqueue_full_drops() {
        let (queue, _rx) = ScanQueue::new(2);
        assert_eq!(queue.enqueue(addr(1)), EnqueueResult::Queued);
        assert_eq!(queue.enqueue(addr(2)), EnqueueResult::Queued);
        assert_eq!(queue.enqueue(addr(3)), EnqueueResult::Full);
        // Dropped requests are not marked pending.
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_enqueue_closed() {
        let (queue, rx) = ScanQueue::new(2);
        drop(rx);
        assert_eq!(queue.enqueue(addr(1)), EnqueueResult::Closed);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_received_in_order() {
        let (queue, mut rx) = ScanQueue::new(8);
        for i in 0..3 {
            queue.enqueue(addr(i));
        }
        for i in 0..3 {
            assert_eq!(rx.recv().await, Some(addr(i)));
        }
    }
}
