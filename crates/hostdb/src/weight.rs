//! Reliability update rules and the host selection weight.

use crate::config::HostDbConfig;
use crate::types::{Currency, HostSettings};

/// One coin in base units. Scales weight so typical prices keep precision.
const WEIGHT_SCALE: u128 = 1_000_000_000_000_000_000_000_000;

/// Reliability after a successful scan, saturating at the configured maximum.
pub fn reward(reliability: Currency, config: &HostDbConfig) -> Currency {
    reliability
        .saturating_add(config.reliability_reward)
        .min(config.max_reliability)
}

/// Reliability after a failed scan, floored at zero.
pub fn penalize(reliability: Currency, config: &HostDbConfig) -> Currency {
    reliability.saturating_sub(config.unreachable_penalty)
}

/// Selection weight: proportional to reliability, inversely to price.
///
/// Zero only when reliability is zero, so any host with a non-zero score
/// can be drawn.
pub fn host_weight(reliability: Currency, settings: &HostSettings) -> Currency {
    if reliability.is_zero() {
        return Currency::ZERO;
    }
    let price = settings
        .contract_price
        .saturating_add(settings.storage_price)
        .saturating_add(Currency::new(1));
    let weight = reliability
        .saturating_mul(Currency::new(WEIGHT_SCALE))
        .div(price.get());
    weight.max(Currency::new(1))
}
