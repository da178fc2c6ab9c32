//! Host database events and non-blocking broadcast emitter.

use tokio::sync::broadcast;

use crate::config::EVENT_CHANNEL_CAPACITY;
use crate::types::{Currency, NetAddress};

/// Host database events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A new entry was created in the registry.
    Discovered { address: NetAddress },
    /// A probe completed and its result was applied.
    Scanned {
        address: NetAddress,
        success: bool,
        reliability: Currency,
    },
    /// The host entered the active set.
    Activated { address: NetAddress },
    /// The host left the active set but remains known.
    Deactivated { address: NetAddress },
    /// The host was evicted from the registry.
    Removed { address: NetAddress },
}

impl HostEvent {
    pub fn address(&self) -> &NetAddress {
        match self {
            Self::Discovered { address }
            | Self::Scanned { address, .. }
            | Self::Activated { address }
            | Self::Deactivated { address }
            | Self::Removed { address } => address,
        }
    }

    pub fn is_membership_event(&self) -> bool {
        matches!(self, Self::Activated { .. } | Self::Deactivated { .. })
    }
}

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<HostEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: HostEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn discovered(&self, address: NetAddress) {
        self.emit(HostEvent::Discovered { address });
    }

    pub(crate) fn scanned(&self, address: NetAddress, success: bool, reliability: Currency) {
        self.emit(HostEvent::Scanned {
            address,
            success,
            reliability,
        });
    }

    pub(crate) fn activated(&self, address: NetAddress) {
        self.emit(HostEvent::Activated { address });
    }

    pub(crate) fn deactivated(&self, address: NetAddress) {
        self.emit(HostEvent::Deactivated { address });
    }

    pub(crate) fn removed(&self, address: NetAddress) {
        self.emit(HostEvent::Removed { address });
    }
}
