//! Registry record for a single host.

use serde::{Deserialize, Serialize};

use crate::config::HostDbConfig;
use crate::types::{BlockHeight, Currency, HostDbEntry, HostSettings, NetAddress, PublicKey};
use crate::weight;

/// A host plus the reputation metadata the registry keeps about it.
///
/// Timestamps are unix seconds. `last_seen` is only ever set together with
/// `last_scanned`, so `last_seen <= last_scanned` holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub host: HostDbEntry,
    pub first_seen: BlockHeight,
    pub weight: Currency,
    pub reliability: Currency,
    /// Most recent probe attempt, successful or not.
    pub last_scanned: Option<u64>,
    /// Most recent successful probe.
    pub last_seen: Option<u64>,
}

impl HostEntry {
    pub(crate) fn new(host: HostDbEntry, first_seen: BlockHeight, config: &HostDbConfig) -> Self {
        let reliability = config.default_reliability;
        Self {
            weight: weight::host_weight(reliability, &host.settings),
            host,
            first_seen,
            reliability,
            last_scanned: None,
            last_seen: None,
        }
    }

    pub fn net_address(&self) -> &NetAddress {
        &self.host.net_address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.host.public_key
    }

    pub fn settings(&self) -> &HostSettings {
        &self.host.settings
    }

    /// True once at least one probe has succeeded.
    pub fn has_been_seen(&self) -> bool {
        self.last_seen.is_some()
    }

    /// Eligible for the active set: seen at least once and reliability above the floor.
    pub fn is_selectable(&self, config: &HostDbConfig) -> bool {
        self.has_been_seen() && self.reliability > config.min_active_reliability
    }

    pub(crate) fn record_success(
        &mut self,
        now: u64,
        settings: Option<HostSettings>,
        config: &HostDbConfig,
    ) {
        if let Some(settings) = settings {
            self.host.settings = settings;
        }
        self.last_scanned = Some(now);
        self.last_seen = Some(now);
        self.reliability = weight::reward(self.reliability, config);
        self.weight = weight::host_weight(self.reliability, &self.host.settings);
    }

    pub(crate) fn record_failure(&mut self, now: u64, config: &HostDbConfig) {
        self.last_scanned = Some(now);
        self.reliability = weight::penalize(self.reliability, config);
        self.weight = weight::host_weight(self.reliability, &self.host.settings);
    }
}
