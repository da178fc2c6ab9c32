//! Host database metrics

use core::fmt;

use metrics::{Counter, Gauge};

/// Host database metrics
#[derive(Clone)]
pub(crate) struct HostDbMetrics {
    /// Number of completed probes
    scans_total: Counter,
    /// Number of probes that failed or timed out
    scan_failures_total: Counter,
    /// Number of scan requests dropped because the queue was full
    scan_queue_dropped_total: Counter,
    /// Number of hosts in the registry
    hosts_total: Gauge,
    /// Number of hosts eligible for selection
    active_hosts: Gauge,
}

impl fmt::Debug for HostDbMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDbMetrics").finish_non_exhaustive()
    }
}

impl Default for HostDbMetrics {
    fn default() -> Self {
        Self {
            scans_total: metrics::counter!("hostdb.scans_total"),
            scan_failures_total: metrics::counter!("hostdb.scan_failures_total"),
            scan_queue_dropped_total: metrics::counter!("hostdb.scan_queue_dropped_total"),
            hosts_total: metrics::gauge!("hostdb.hosts_total"),
            active_hosts: metrics::gauge!("hostdb.active_hosts"),
        }
    }
}

impl HostDbMetrics {
    pub(crate) fn record_scan(&self, success: bool) {
        self.scans_total.increment(1);
        if !success {
            self.scan_failures_total.increment(1);
        }
    }

    pub(crate) fn record_queue_drop(&self) {
        self.scan_queue_dropped_total.increment(1);
    }

    pub(crate) fn set_population(&self, hosts: usize, active: usize) {
        self.hosts_total.set(hosts as f64);
        self.active_hosts.set(active as f64);
    }
}
