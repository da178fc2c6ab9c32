//! Host database configuration (TOML-serializable).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Currency;

/// Reliability of a newly discovered host.
pub const DEFAULT_RELIABILITY: u128 = 20;
/// Ceiling reached after repeated successful scans.
pub const MAX_RELIABILITY: u128 = 50;
pub const RELIABILITY_REWARD: u128 = 10;
pub const UNREACHABLE_PENALTY: u128 = 10;
/// Hosts must stay strictly above this reliability to remain selectable.
pub const MIN_ACTIVE_RELIABILITY: u128 = 0;
/// Three days.
pub const UPTIME_THRESHOLD_SECS: u64 = 3 * 24 * 60 * 60;
pub const SCAN_TIMEOUT_SECS: u64 = 30;
/// Sample size used when estimating the average contract price.
pub const PRICE_SAMPLE_SIZE: usize = 18;
pub const SCAN_QUEUE_CAPACITY: usize = 1000;
pub const MAX_CONCURRENT_SCANS: usize = 8;
pub const CHECKUP_INTERVAL_SECS: u64 = 30 * 60;
pub const CHECKUP_QUANTITY: usize = 250;
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Host database configuration.
///
/// Every field falls back to its default when absent from the file, so a
/// partial TOML table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDbConfig {
    #[serde(default = "default_reliability")]
    pub default_reliability: Currency,

    #[serde(default = "default_max_reliability")]
    pub max_reliability: Currency,

    /// Added to reliability on every successful scan.
    #[serde(default = "default_reliability_reward")]
    pub reliability_reward: Currency,

    /// Subtracted from reliability on every failed scan.
    #[serde(default = "default_unreachable_penalty")]
    pub unreachable_penalty: Currency,

    #[serde(default = "default_min_active_reliability")]
    pub min_active_reliability: Currency,

    /// Age after which a scan result is stale and liveness must be re-checked.
    #[serde(default = "default_uptime_threshold_secs")]
    pub uptime_threshold_secs: u64,

    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    #[serde(default = "default_price_sample_size")]
    pub price_sample_size: usize,

    #[serde(default = "default_scan_queue_capacity")]
    pub scan_queue_capacity: usize,

    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,

    /// Period of the background re-scan of known hosts. Zero disables it.
    #[serde(default = "default_checkup_interval_secs")]
    pub checkup_interval_secs: u64,

    #[serde(default = "default_checkup_quantity")]
    pub checkup_quantity: usize,

    /// Accept loopback and private addresses (test networks).
    #[serde(default)]
    pub allow_local_addresses: bool,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for HostDbConfig {
    fn default() -> Self {
        Self {
            default_reliability: default_reliability(),
            max_reliability: default_max_reliability(),
            reliability_reward: default_reliability_reward(),
            unreachable_penalty: default_unreachable_penalty(),
            min_active_reliability: default_min_active_reliability(),
            uptime_threshold_secs: default_uptime_threshold_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
            price_sample_size: default_price_sample_size(),
            scan_queue_capacity: default_scan_queue_capacity(),
            max_concurrent_scans: default_max_concurrent_scans(),
            checkup_interval_secs: default_checkup_interval_secs(),
            checkup_quantity: default_checkup_quantity(),
            allow_local_addresses: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl HostDbConfig {
    /// Config for local test networks: loopback and private hosts are accepted.
    pub fn testing() -> Self {
        Self {
            allow_local_addresses: true,
            ..Default::default()
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn checkup_interval(&self) -> Option<Duration> {
        (self.checkup_interval_secs > 0).then(|| Duration::from_secs(self.checkup_interval_secs))
    }
}

fn default_reliability() -> Currency {
    Currency::new(DEFAULT_RELIABILITY)
}

fn default_max_reliability() -> Currency {
    Currency::new(MAX_RELIABILITY)
}

fn default_reliability_reward() -> Currency {
    Currency::new(RELIABILITY_REWARD)
}

fn default_unreachable_penalty() -> Currency {
    Currency::new(UNREACHABLE_PENALTY)
}

fn default_min_active_reliability() -> Currency {
    Currency::new(MIN_ACTIVE_RELIABILITY)
}

fn default_uptime_threshold_secs() -> u64 {
    UPTIME_THRESHOLD_SECS
}

fn default_scan_timeout_secs() -> u64 {
    SCAN_TIMEOUT_SECS
}

fn default_price_sample_size() -> usize {
    PRICE_SAMPLE_SIZE
}

fn default_scan_queue_capacity() -> usize {
    SCAN_QUEUE_CAPACITY
}

fn default_max_concurrent_scans() -> usize {
    MAX_CONCURRENT_SCANS
}

fn default_checkup_interval_secs() -> u64 {
    CHECKUP_INTERVAL_SECS
}

fn default_checkup_quantity() -> usize {
    CHECKUP_QUANTITY
}

fn default_event_channel_capacity() -> usize {
    EVENT_CHANNEL_CAPACITY
}
