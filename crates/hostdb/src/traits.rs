//! Collaborators injected into the host database.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::probe::ProbeError;
use crate::types::{BlockHeight, HostSettings, NetAddress, PublicKey};
use crate::validator::NetAddressError;

/// Decides whether a discovered address may enter the registry.
#[auto_impl(&, Box, Arc)]
pub trait AddressValidator: Send + Sync {
    fn validate(&self, address: &NetAddress) -> Result<(), NetAddressError>;
}

/// Outcome of a probe: `Ok(Some(_))` carries refreshed settings, `Ok(None)`
/// means the host answered but settings were not fetched.
pub type ProbeResult = Result<Option<HostSettings>, ProbeError>;

/// Network round-trip that verifies a host is alive.
///
/// Implementations should honour `timeout`; the scanner enforces it again
/// and treats an overrun as [`ProbeError::Timeout`].
#[async_trait]
pub trait HostProber: Send + Sync + 'static {
    async fn probe(
        &self,
        address: &NetAddress,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> ProbeResult;
}

/// Source of the current chain height.
#[auto_impl(&, Box, Arc)]
pub trait BlockHeightSource: Send + Sync {
    fn block_height(&self) -> BlockHeight;
}

/// Wall clock in unix seconds.
#[auto_impl(&, Box, Arc)]
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        current_unix_timestamp()
    }
}

/// Manually advanced clock for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Block height updated by a consensus subscriber.
#[derive(Debug, Default)]
pub struct AtomicBlockHeight(AtomicU64);

impl AtomicBlockHeight {
    pub fn new(height: BlockHeight) -> Self {
        Self(AtomicU64::new(height))
    }

    pub fn set(&self, height: BlockHeight) {
        self.0.store(height, Ordering::Relaxed);
    }
}

impl BlockHeightSource for AtomicBlockHeight {
    fn block_height(&self) -> BlockHeight {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) fn current_unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
