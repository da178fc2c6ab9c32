//! The host database: registry, active set and scan bookkeeping behind one lock.
//!
//! The registry (every known host) and the active set (hosts eligible for
//! selection) are guarded by a single `RwLock` so that the active set can
//! never reference a host missing from the registry. Probes run without the
//! lock held; their results are folded back in under the write lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::config::HostDbConfig;
use crate::entry::HostEntry;
use crate::events::{EventEmitter, HostEvent};
use crate::metrics::HostDbMetrics;
use crate::probe::ProbeError;
use crate::scan::{EnqueueResult, ScanOutcome, ScanQueue, Scanner};
use crate::store::{HostStore, HostStoreError};
use crate::traits::{
    AddressValidator, AtomicBlockHeight, BlockHeightSource, Clock, HostProber, ProbeResult,
    SystemClock,
};
use crate::tree::HostTree;
use crate::types::{Currency, HostDbEntry, NetAddress, PublicKey};
use crate::validator::StandardValidator;

#[derive(Debug, Default)]
struct HostDbState {
    /// Every known host, active or not.
    hosts: HashMap<NetAddress, HostEntry>,
    /// Hosts eligible for selection, weighted by `HostEntry::weight`.
    active: HostTree,
}

impl HostDbState {
    /// Bring active-set membership in line with the entry. Returns the
    /// membership change, if any: `Some(true)` activated, `Some(false)` deactivated.
    fn sync_membership(&mut self, address: &NetAddress, config: &HostDbConfig) -> Option<bool> {
        let Some(entry) = self.hosts.get(address) else {
            return self.active.remove(address).map(|_| false);
        };
        if entry.is_selectable(config) {
            self.active
                .insert(address.clone(), entry.weight.get())
                .then_some(true)
        } else {
            self.active.remove(address).map(|_| false)
        }
    }
}

/// Builder wiring collaborators into a [`HostDb`].
pub struct HostDbBuilder {
    config: HostDbConfig,
    prober: Arc<dyn HostProber>,
    validator: Option<Box<dyn AddressValidator>>,
    height: Option<Box<dyn BlockHeightSource>>,
    clock: Option<Box<dyn Clock>>,
}

impl std::fmt::Debug for HostDbBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDbBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HostDbBuilder {
    /// Replace the default [`StandardValidator`].
    pub fn validator(mut self, validator: impl AddressValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Replace the default height source, which always reports zero.
    pub fn block_height(mut self, height: impl BlockHeightSource + 'static) -> Self {
        self.height = Some(Box::new(height));
        self
    }

    /// Replace the default [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Build the database and the scanner that drains its queue.
    ///
    /// The scanner does nothing until [`Scanner::run`] is spawned; hosts
    /// inserted before that stay queued.
    pub fn build(self) -> (Arc<HostDb>, Scanner) {
        let (queue, rx) = ScanQueue::new(self.config.scan_queue_capacity);
        let validator = self.validator.unwrap_or_else(|| {
            Box::new(StandardValidator::new(self.config.allow_local_addresses))
        });
        let hostdb = Arc::new(HostDb {
            events: EventEmitter::new(self.config.event_channel_capacity),
            state: RwLock::new(HostDbState::default()),
            queue,
            validator,
            prober: self.prober,
            height: self
                .height
                .unwrap_or_else(|| Box::new(AtomicBlockHeight::default())),
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock)),
            metrics: HostDbMetrics::default(),
            config: self.config,
        });
        let scanner = Scanner::new(Arc::clone(&hostdb), rx);
        (hostdb, scanner)
    }
}

/// Concurrency-safe registry of storage hosts with reliability tracking and
/// weighted random selection.
pub struct HostDb {
    config: HostDbConfig,
    state: RwLock<HostDbState>,
    queue: ScanQueue,
    validator: Box<dyn AddressValidator>,
    prober: Arc<dyn HostProber>,
    height: Box<dyn BlockHeightSource>,
    clock: Box<dyn Clock>,
    events: EventEmitter,
    metrics: HostDbMetrics,
}

impl std::fmt::Debug for HostDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("HostDb")
            .field("hosts", &state.hosts.len())
            .field("active", &state.active.len())
            .finish_non_exhaustive()
    }
}

impl HostDb {
    pub fn builder(config: HostDbConfig, prober: impl HostProber) -> HostDbBuilder {
        HostDbBuilder {
            config,
            prober: Arc::new(prober),
            validator: None,
            height: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &HostDbConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    pub fn host_count(&self) -> usize {
        self.state.read().hosts.len()
    }

    pub fn active_count(&self) -> usize {
        self.state.read().active.len()
    }

    /// Number of hosts queued for or undergoing a background scan.
    pub fn pending_scans(&self) -> usize {
        self.queue.pending_len()
    }

    /// Add a discovered host and queue it for scanning.
    ///
    /// Invalid addresses are logged and dropped. Re-announcing a known host
    /// with the same public key is a no-op. A known address announced with a
    /// different public key replaces the old entry.
    pub fn insert_host(&self, host: HostDbEntry) {
        if let Err(e) = self.validator.validate(&host.net_address) {
            debug!(address = %host.net_address, error = %e, "host has an invalid net address");
            return;
        }

        let address = host.net_address.clone();
        let rekeyed = {
            let mut state = self.state.write();
            let rekeyed = match state.hosts.get(&address) {
                Some(known) if known.public_key() == &host.public_key => return,
                Some(known) => {
                    debug!(%address, old = %known.public_key(), new = %host.public_key, "host public key changed");
                    true
                }
                None => false,
            };
            if state.active.remove(&address).is_some() {
                self.events.deactivated(address.clone());
            }

            let entry = HostEntry::new(host, self.height.block_height(), &self.config);
            state.hosts.insert(address.clone(), entry);
            self.metrics
                .set_population(state.hosts.len(), state.active.len());
            self.events.discovered(address.clone());
            rekeyed
        };

        if rekeyed {
            // A scan of the old key may be in flight; make sure the new key gets its own.
            self.queue_rescan(address);
        } else {
            self.queue_scan(address);
        }
    }

    /// Evict a host. Removing an unknown host is a no-op.
    pub fn remove_host(&self, address: &NetAddress) {
        let mut state = self.state.write();
        state.active.remove(address);
        if state.hosts.remove(address).is_some() {
            self.metrics
                .set_population(state.hosts.len(), state.active.len());
            debug!(%address, "host removed");
            self.events.removed(address.clone());
        }
    }

    /// Identity and settings of a known host.
    pub fn host(&self, address: &NetAddress) -> Option<HostDbEntry> {
        self.state.read().hosts.get(address).map(|e| e.host.clone())
    }

    /// Full registry record, including reputation metadata.
    pub fn host_entry(&self, address: &NetAddress) -> Option<HostEntry> {
        self.state.read().hosts.get(address).cloned()
    }

    pub fn is_active(&self, address: &NetAddress) -> bool {
        self.state.read().active.contains(address)
    }

    /// Every known host, including inactive and unreachable ones. Unordered.
    pub fn all_hosts(&self) -> Vec<HostDbEntry> {
        self.state
            .read()
            .hosts
            .values()
            .map(|e| e.host.clone())
            .collect()
    }

    /// All active hosts as a weighted random ordering, used as the preference list.
    ///
    /// The active count is read and the lock released before sampling, so
    /// hosts inserted or removed in between may or may not be reflected.
    pub fn active_hosts(&self) -> Vec<HostDbEntry> {
        let count = self.state.read().active.len();
        self.random_hosts(count, &[])
    }

    /// Up to `n` distinct active hosts drawn by weight, none of them in `exclude`.
    pub fn random_hosts(&self, n: usize, exclude: &[NetAddress]) -> Vec<HostDbEntry> {
        if n == 0 {
            return Vec::new();
        }
        let exclude: HashSet<NetAddress> = exclude.iter().cloned().collect();

        let mut state = self.state.write();
        let HostDbState { hosts, active } = &mut *state;
        active
            .sample(n, &exclude, &mut rand::rng())
            .into_iter()
            .filter_map(|address| hosts.get(&address).map(|e| e.host.clone()))
            .collect()
    }

    /// Mean contract price over a weighted sample of active hosts. Zero when
    /// there are no active hosts.
    pub fn average_contract_price(&self) -> Currency {
        let hosts = self.random_hosts(self.config.price_sample_size, &[]);
        if hosts.is_empty() {
            return Currency::ZERO;
        }
        let total: Currency = hosts.iter().map(|h| h.settings.contract_price).sum();
        total.div(hosts.len() as u128)
    }

    /// Whether a host is offline.
    ///
    /// A host is offline if it has been scanned within the uptime threshold
    /// but not seen during that period. If its last scan is older than the
    /// threshold it is probed first, so callers should treat this as
    /// blocking. Unknown hosts are never offline.
    pub async fn is_offline(&self, address: &NetAddress) -> bool {
        let Some((last_scanned, mut last_seen)) = self.scan_times(address) else {
            return false;
        };

        if self.is_stale(last_scanned) {
            trace!(%address, "scan data stale, probing before liveness check");
            self.scan_host(address).await;

            match self.scan_times(address) {
                Some((_, seen)) => last_seen = seen,
                None => {
                    warn!(%address, "no entry for host immediately after scanning");
                    return false;
                }
            }
        }

        self.is_stale(last_seen)
    }

    /// Probe a host now, bypassing the queue, and apply the result.
    pub async fn scan_host(&self, address: &NetAddress) -> ScanOutcome {
        let Some(public_key) = self
            .state
            .read()
            .hosts
            .get(address)
            .map(|e| e.public_key().clone())
        else {
            return ScanOutcome::Vanished;
        };

        let result = self.probe(address, &public_key).await;
        self.apply_scan_result(address, &public_key, result)
    }

    /// Queue a known host for a background scan.
    pub fn queue_scan(&self, address: NetAddress) -> EnqueueResult {
        let result = self.queue.enqueue(address.clone());
        match result {
            EnqueueResult::Queued => trace!(%address, "host queued for scan"),
            EnqueueResult::AlreadyPending => trace!(%address, "host already pending scan"),
            EnqueueResult::Full => {
                debug!(%address, "scan queue full, dropping scan request");
                self.metrics.record_queue_drop();
            }
            EnqueueResult::Closed => debug!(%address, "scanner stopped, dropping scan request"),
        }
        result
    }

    /// Queue a host whose entry changed, even if a scan is already pending.
    ///
    /// A pending scan may have read the previous entry, so the host is
    /// queued again once that scan completes.
    fn queue_rescan(&self, address: NetAddress) -> EnqueueResult {
        if self.queue.mark_rescan(&address) {
            trace!(%address, "host marked for rescan after pending scan");
            return EnqueueResult::AlreadyPending;
        }
        self.queue_scan(address)
    }

    /// Queue a uniform random subset of all known hosts for rescanning.
    /// Returns how many were newly queued.
    pub fn queue_checkup(&self) -> usize {
        let picked: Vec<NetAddress> = {
            let state = self.state.read();
            state
                .hosts
                .keys()
                .cloned()
                .choose_multiple(&mut rand::rng(), self.config.checkup_quantity)
        };
        picked
            .into_iter()
            .filter(|address| self.queue_scan(address.clone()) == EnqueueResult::Queued)
            .count()
    }

    /// Replace the contents of `store` with the current registry and flush it.
    pub fn save_to_store<S>(&self, store: &S) -> Result<usize, HostStoreError>
    where
        S: HostStore + ?Sized,
    {
        let entries: Vec<HostEntry> = self.state.read().hosts.values().cloned().collect();
        let count = entries.len();
        store.clear()?;
        store.save_batch(&entries)?;
        store.flush()?;
        debug!(count, "saved hosts to store");
        Ok(count)
    }

    /// Merge entries from `store` into the registry, rebuilding active-set
    /// membership from each entry's scan history and reliability.
    ///
    /// Entries whose address fails validation are skipped. Entries that are
    /// not selectable are queued for a scan. Returns the number loaded.
    pub fn load_from_store<S>(&self, store: &S) -> Result<usize, HostStoreError>
    where
        S: HostStore + ?Sized,
    {
        let mut unproven = Vec::new();
        let mut count = 0;
        {
            let mut state = self.state.write();
            for entry in store.load_all()? {
                let address = entry.net_address().clone();
                if let Err(e) = self.validator.validate(&address) {
                    debug!(%address, error = %e, "skipping stored host with invalid net address");
                    continue;
                }
                if !entry.is_selectable(&self.config) {
                    unproven.push(address.clone());
                }
                state.hosts.insert(address.clone(), entry);
                if state.sync_membership(&address, &self.config) == Some(true) {
                    self.events.activated(address);
                }
                count += 1;
            }
            self.metrics
                .set_population(state.hosts.len(), state.active.len());
        }

        let queued = unproven.len();
        for address in unproven {
            self.queue_scan(address);
        }
        debug!(count, queued, "loaded hosts from store");
        Ok(count)
    }

    /// Release a host after a pipeline scan and queue it again if its entry
    /// was replaced while the scan was pending.
    pub(crate) fn complete_scan(&self, address: NetAddress, outcome: ScanOutcome) {
        let rescan = self.queue.finish(&address);
        if rescan || outcome == ScanOutcome::Replaced {
            self.queue_scan(address);
        }
    }

    async fn probe(&self, address: &NetAddress, public_key: &PublicKey) -> ProbeResult {
        let timeout = self.config.scan_timeout();
        match tokio::time::timeout(timeout, self.prober.probe(address, public_key, timeout)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        }
    }

    fn apply_scan_result(
        &self,
        address: &NetAddress,
        public_key: &PublicKey,
        result: ProbeResult,
    ) -> ScanOutcome {
        let now = self.clock.now();
        let success = result.is_ok();

        let mut state = self.state.write();
        let Some(entry) = state.hosts.get_mut(address) else {
            debug!(%address, "host removed while being scanned");
            return ScanOutcome::Vanished;
        };
        if entry.public_key() != public_key {
            debug!(%address, "host replaced while being scanned, discarding result");
            return ScanOutcome::Replaced;
        }

        match result {
            Ok(settings) => entry.record_success(now, settings, &self.config),
            Err(e) => {
                debug!(%address, error = %e, kind = e.kind(), "host scan failed");
                entry.record_failure(now, &self.config);
            }
        }
        let reliability = entry.reliability;
        let membership = state.sync_membership(address, &self.config);
        self.metrics
            .set_population(state.hosts.len(), state.active.len());
        self.metrics.record_scan(success);

        // Emitted under the lock so subscribers see changes in commit order.
        self.events.scanned(address.clone(), success, reliability);
        match membership {
            Some(true) => {
                debug!(%address, %reliability, "host activated");
                self.events.activated(address.clone());
            }
            Some(false) => {
                debug!(%address, %reliability, "host deactivated");
                self.events.deactivated(address.clone());
            }
            None => {}
        }

        ScanOutcome::Applied { success }
    }

    fn scan_times(&self, address: &NetAddress) -> Option<(Option<u64>, Option<u64>)> {
        self.state
            .read()
            .hosts
            .get(address)
            .map(|e| (e.last_scanned, e.last_seen))
    }

    /// True if `at` is missing or older than the uptime threshold.
    fn is_stale(&self, at: Option<u64>) -> bool {
        match at {
            Some(at) => self.clock.now().saturating_sub(at) > self.config.uptime_threshold_secs,
            None => true,
        }
    }

    #[cfg(test)]
    fn assert_active_subset_of_registry(&self) {
        let state = self.state.read();
        for address in state.active.addresses() {
            assert!(
                state.hosts.contains_key(address),
                "active host {address} missing from registry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::MemoryHostStore;
    use crate::traits::ManualClock;

    const DAY: u64 = 24 * 60 * 60;

    /// Prober whose answer is flipped by the test.
    #[derive(Debug, Default)]
    struct ToggleProber {
        online: std::sync::atomic::AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HostProber for Arc<ToggleProber> {
        async fn probe(
            &self,
            _address: &NetAddress,
            _public_key: &PublicKey,
            _timeout: Duration,
        ) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.online.load(Ordering::SeqCst) {
                Ok(None)
            } else {
                Err(ProbeError::Refused)
            }
        }
    }

    struct Fixture {
        hostdb: Arc<HostDb>,
        prober: Arc<ToggleProber>,
        clock: Arc<ManualClock>,
        height: Arc<AtomicBlockHeight>,
        _scanner: Scanner,
    }

    fn fixture() -> Fixture {
        let prober = Arc::new(ToggleProber::default());
        let clock = Arc::new(ManualClock::new(100 * DAY));
        let height = Arc::new(AtomicBlockHeight::new(10));
        let (hostdb, scanner) = HostDb::builder(HostDbConfig::testing(), Arc::clone(&prober))
            .clock(Arc::clone(&clock))
            .block_height(Arc::clone(&height))
            .build();
        Fixture {
            hostdb,
            prober,
            clock,
            height,
            _scanner: scanner,
        }
    }

    fn addr(i: u8) -> NetAddress {
        NetAddress::new(format!("127.0.0.{i}:9982"))
    }

    fn host(i: u8) -> HostDbEntry {
        HostDbEntry::new(addr(i), PublicKey::ed25519(vec![i; 32]))
    }

    fn priced_host(i: u8, contract_price: u128) -> HostDbEntry {
        host(i).with_settings(crate::types::HostSettings {
            contract_price: Currency::new(contract_price),
            ..Default::default()
        })
    }

    async fn activate(f: &Fixture, i: u8) {
        f.prober.online.store(true, Ordering::SeqCst);
        assert_eq!(
            f.hostdb.scan_host(&addr(i)).await,
            ScanOutcome::Applied { success: true }
        );
    }

    #[test]
    fn test_insert_and_lookup() {
        let f = fixture();
        f.hostdb.insert_host(host(1));

        assert_eq!(f.hostdb.host(&addr(1)), Some(host(1)));
        let entry = f.hostdb.host_entry(&addr(1)).unwrap();
        assert_eq!(entry.first_seen, 10);
        assert_eq!(entry.reliability, f.hostdb.config().default_reliability);
        assert_eq!(f.hostdb.pending_scans(), 1);
        assert!(!f.hostdb.is_active(&addr(1)));
    }

    #[test]
    fn test_insert_invalid_address_is_dropped() {
        let prober = Arc::new(ToggleProber::default());
        let (hostdb, _scanner) = HostDb::builder(HostDbConfig::default(), prober).build();

        hostdb.insert_host(host(1)); // loopback rejected outside test configs
        hostdb.insert_host(HostDbEntry::new("no-port", PublicKey::ed25519(vec![2])));

        assert_eq!(hostdb.host_count(), 0);
        assert_eq!(hostdb.pending_scans(), 0);
    }

    #[tokio::test]
    async fn test_reinsert_same_key_is_noop() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        activate(&f, 1).await;
        let before = f.hostdb.host_entry(&addr(1)).unwrap();

        f.height.set(99);
        f.hostdb.insert_host(host(1));

        let after = f.hostdb.host_entry(&addr(1)).unwrap();
        assert_eq!(before, after);
        assert!(f.hostdb.is_active(&addr(1)));
    }

    #[tokio::test]
    async fn test_reinsert_new_key_replaces_entry() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        activate(&f, 1).await;
        assert!(f.hostdb.is_active(&addr(1)));

        f.height.set(50);
        let rekeyed = HostDbEntry::new(addr(1), PublicKey::ed25519(vec![0xaa; 32]));
        f.hostdb.insert_host(rekeyed.clone());

        let entry = f.hostdb.host_entry(&addr(1)).unwrap();
        assert_eq!(entry.host, rekeyed);
        assert_eq!(entry.first_seen, 50);
        assert_eq!(entry.reliability, f.hostdb.config().default_reliability);
        assert!(entry.last_seen.is_none());
        assert!(!f.hostdb.is_active(&addr(1)));
        assert_eq!(f.hostdb.host_count(), 1);
        f.hostdb.assert_active_subset_of_registry();
    }

    #[tokio::test]
    async fn test_remove_is_total_and_idempotent() {
        let f = fixture();
        for i in 1..=3 {
            f.hostdb.insert_host(host(i));
            activate(&f, i).await;
        }
        assert_eq!(f.hostdb.active_count(), 3);

        f.hostdb.remove_host(&addr(2));
        f.hostdb.remove_host(&addr(2));
        f.hostdb.remove_host(&addr(9));

        assert!(f.hostdb.host(&addr(2)).is_none());
        assert_eq!(f.hostdb.host_count(), 2);
        for n in 0..5 {
            assert!(
                f.hostdb
                    .random_hosts(n, &[])
                    .iter()
                    .all(|h| h.net_address != addr(2))
            );
        }
        assert_eq!(f.hostdb.active_hosts().len(), 2);
        f.hostdb.assert_active_subset_of_registry();
    }

    #[tokio::test]
    async fn test_scan_vanished_host() {
        let f = fixture();
        assert_eq!(f.hostdb.scan_host(&addr(1)).await, ScanOutcome::Vanished);
    }

    #[tokio::test]
    async fn test_failures_deactivate_but_keep_host() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        activate(&f, 1).await;

        f.prober.online.store(false, Ordering::SeqCst);
        for _ in 0..3 {
            f.hostdb.scan_host(&addr(1)).await;
        }

        let entry = f.hostdb.host_entry(&addr(1)).unwrap();
        assert_eq!(entry.reliability, Currency::ZERO);
        assert!(!f.hostdb.is_active(&addr(1)));
        assert_eq!(f.hostdb.all_hosts().len(), 1);
        assert!(f.hostdb.active_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_host_is_not_offline() {
        let f = fixture();
        assert!(!f.hostdb.is_offline(&addr(7)).await);
        assert_eq!(f.prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_uses_fresh_data_without_scanning() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        f.hostdb.insert_host(host(2));

        // Host 1 answered, host 2 was scanned but never answered.
        activate(&f, 1).await;
        f.prober.online.store(false, Ordering::SeqCst);
        f.hostdb.scan_host(&addr(2)).await;
        let calls = f.prober.calls.load(Ordering::SeqCst);

        f.clock.advance(Duration::from_secs(DAY));
        assert!(!f.hostdb.is_offline(&addr(1)).await);
        assert!(f.hostdb.is_offline(&addr(2)).await);
        assert_eq!(f.prober.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_offline_rescans_stale_host() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        activate(&f, 1).await;
        let calls = f.prober.calls.load(Ordering::SeqCst);

        f.clock.advance(Duration::from_secs(4 * DAY));

        // Stale: rescanned, host is still up.
        assert!(!f.hostdb.is_offline(&addr(1)).await);
        assert_eq!(f.prober.calls.load(Ordering::SeqCst), calls + 1);

        // Stale again and now down: last_seen is older than the threshold.
        f.clock.advance(Duration::from_secs(4 * DAY));
        f.prober.online.store(false, Ordering::SeqCst);
        assert!(f.hostdb.is_offline(&addr(1)).await);
        assert_eq!(f.prober.calls.load(Ordering::SeqCst), calls + 2);
    }

    #[tokio::test]
    async fn test_never_scanned_host_is_probed() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        f.prober.online.store(true, Ordering::SeqCst);

        assert!(!f.hostdb.is_offline(&addr(1)).await);
        assert_eq!(f.prober.calls.load(Ordering::SeqCst), 1);
        assert!(f.hostdb.is_active(&addr(1)));
    }

    #[test]
    fn test_average_price_empty_is_zero() {
        let f = fixture();
        assert_eq!(f.hostdb.average_contract_price(), Currency::ZERO);
        f.hostdb.insert_host(priced_host(1, 100));
        // Known but not active.
        assert_eq!(f.hostdb.average_contract_price(), Currency::ZERO);
    }

    #[tokio::test]
    async fn test_average_price() {
        let f = fixture();
        for (i, price) in [(1, 100), (2, 200), (3, 300)] {
            f.hostdb.insert_host(priced_host(i, price));
            activate(&f, i).await;
        }
        assert_eq!(f.hostdb.average_contract_price(), Currency::new(200));
    }

    #[tokio::test]
    async fn test_random_hosts_exclusion_and_count() {
        let f = fixture();
        for i in 1..=10 {
            f.hostdb.insert_host(host(i));
            activate(&f, i).await;
        }
        let exclude = [addr(1), addr(2), addr(3)];

        for n in [0, 1, 5, 7, 20] {
            let hosts = f.hostdb.random_hosts(n, &exclude);
            assert_eq!(hosts.len(), n.min(7));
            let unique: HashSet<_> = hosts.iter().map(|h| h.net_address.clone()).collect();
            assert_eq!(unique.len(), hosts.len());
            assert!(unique.iter().all(|a| !exclude.contains(a)));
        }
        assert_eq!(f.hostdb.active_count(), 10);
    }

    #[tokio::test]
    async fn test_store_roundtrip_restores_active_set() {
        let f = fixture();
        for i in 1..=3 {
            f.hostdb.insert_host(host(i));
        }
        activate(&f, 1).await;
        activate(&f, 2).await;

        let store = MemoryHostStore::new();
        assert_eq!(f.hostdb.save_to_store(&store).unwrap(), 3);

        let g = fixture();
        assert_eq!(g.hostdb.load_from_store(&store).unwrap(), 3);
        assert_eq!(g.hostdb.host_count(), 3);
        assert_eq!(g.hostdb.active_count(), 2);
        assert!(!g.hostdb.is_active(&addr(3)));
        assert_eq!(g.hostdb.host_entry(&addr(1)), f.hostdb.host_entry(&addr(1)));
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let f = fixture();
        let mut rx = f.hostdb.subscribe();

        f.hostdb.insert_host(host(1));
        activate(&f, 1).await;
        f.hostdb.remove_host(&addr(1));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                HostEvent::Discovered { address: addr(1) },
                HostEvent::Scanned {
                    address: addr(1),
                    success: true,
                    reliability: Currency::new(30),
                },
                HostEvent::Activated { address: addr(1) },
                HostEvent::Removed { address: addr(1) },
            ]
        );
    }

    #[tokio::test]
    async fn test_rekey_after_scan_applied_is_queued_again() {
        let f = fixture();
        f.hostdb.insert_host(host(1));
        assert_eq!(f.hostdb.pending_scans(), 1);

        // Pipeline scan of the old key lands, then the host is re-keyed
        // before the scan releases the address.
        activate(&f, 1).await;
        let rekeyed = HostDbEntry::new(addr(1), PublicKey::ed25519(vec![9; 32]));
        f.hostdb.insert_host(rekeyed);
        f.hostdb
            .complete_scan(addr(1), ScanOutcome::Applied { success: true });

        assert_eq!(f.hostdb.pending_scans(), 1);
        assert!(f.hostdb.host_entry(&addr(1)).unwrap().last_scanned.is_none());
    }

    #[tokio::test]
    async fn test_load_skips_invalid_and_queues_unproven() {
        let source = fixture();
        source.hostdb.insert_host(host(1));
        activate(&source, 1).await;
        let store = MemoryHostStore::new();
        source.hostdb.save_to_store(&store).unwrap();

        let mut proven = source.hostdb.host_entry(&addr(1)).unwrap();
        proven.host.net_address = NetAddress::new("proven.example.com:9982");
        let mut unproven = source.hostdb.host_entry(&addr(1)).unwrap();
        unproven.host.net_address = NetAddress::new("fresh.example.com:9982");
        unproven.last_seen = None;
        store.save_batch(&[proven, unproven]).unwrap();

        // Default config rejects the loopback entry.
        let prober = Arc::new(ToggleProber::default());
        let (hostdb, _scanner) = HostDb::builder(HostDbConfig::default(), prober).build();
        assert_eq!(hostdb.load_from_store(&store).unwrap(), 2);

        assert!(hostdb.host(&addr(1)).is_none());
        assert!(hostdb.is_active(&NetAddress::new("proven.example.com:9982")));
        assert!(!hostdb.is_active(&NetAddress::new("fresh.example.com:9982")));
        assert_eq!(hostdb.pending_scans(), 1);
    }

    #[test]
    fn test_checkup_queues_known_hosts() {
        let f = fixture();
        for i in 1..=5 {
            f.hostdb.insert_host(host(i));
        }
        // All five already pending from insertion.
        assert_eq!(f.hostdb.queue_checkup(), 0);
        for i in 1..=5 {
            f.hostdb
                .complete_scan(addr(i), ScanOutcome::Applied { success: false });
        }
        assert_eq!(f.hostdb.queue_checkup(), 5);
    }

    #[test]
    fn test_concurrent_insert_remove_sample() {
        use std::thread;

        let f = fixture();
        // Mark hosts active directly so sampling has work to do.
        let config = f.hostdb.config().clone();
        let mut handles = Vec::new();
        for t in 0..8u8 {
            let hostdb = Arc::clone(&f.hostdb);
            let config = config.clone();
            handles.push(thread::spawn(move || {
                for round in 0..200u32 {
                    let i = ((round as u8).wrapping_mul(7).wrapping_add(t)) % 32 + 1;
                    match round % 4 {
                        0 => hostdb.insert_host(host(i)),
                        1 => {
                            let mut state = hostdb.state.write();
                            if let Some(entry) = state.hosts.get_mut(&addr(i)) {
                                entry.record_success(u64::from(round), None, &config);
                            }
                            state.sync_membership(&addr(i), &config);
                        }
                        2 => hostdb.remove_host(&addr(i)),
                        _ => {
                            let sample = hostdb.random_hosts(5, &[addr(i)]);
                            assert!(sample.iter().all(|h| h.net_address != addr(i)));
                            let _ = hostdb.active_hosts();
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        f.hostdb.assert_active_subset_of_registry();
    }
}
