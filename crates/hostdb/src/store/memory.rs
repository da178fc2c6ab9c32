use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::entry::HostEntry;
use crate::types::NetAddress;

use super::{HostStore, HostStoreError};

/// Volatile store, mainly for tests and embedding without a data directory.
#[derive(Debug, Default)]
pub struct MemoryHostStore {
    entries: Mutex<BTreeMap<NetAddress, HostEntry>>,
}

impl MemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostStore for MemoryHostStore {
    fn load_all(&self) -> Result<Vec<HostEntry>, HostStoreError> {
        Ok(self.entries.lock().values().cloned().collect())
    }

    fn save_batch(&self, entries: &[HostEntry]) -> Result<(), HostStoreError> {
        let mut stored = self.entries.lock();
        stored.extend(entries.iter().map(|e| (e.net_address().clone(), e.clone())));
        Ok(())
    }

    fn clear(&self) -> Result<(), HostStoreError> {
        self.entries.lock().clear();
        Ok(())
    }
}
