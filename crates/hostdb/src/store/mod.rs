//! Persistence boundary for the host registry.
//!
//! A store holds a snapshot of registry entries keyed by address.
//! [`HostDb::save_to_store`](crate::HostDb::save_to_store) replaces the
//! snapshot wholesale; [`HostDb::load_from_store`](crate::HostDb::load_from_store)
//! reads it back.

mod file;
mod memory;

use auto_impl::auto_impl;
use thiserror::Error;

use crate::entry::HostEntry;

pub use file::FileHostStore;
pub use memory::MemoryHostStore;

#[derive(Debug, Error)]
pub enum HostStoreError {
    #[error("host store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("host store encoding failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for HostStoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[auto_impl(&, Box, Arc)]
pub trait HostStore: Send + Sync {
    /// Every stored entry, in no particular order.
    fn load_all(&self) -> Result<Vec<HostEntry>, HostStoreError>;

    /// Insert or overwrite entries by address.
    fn save_batch(&self, entries: &[HostEntry]) -> Result<(), HostStoreError>;

    /// Drop every stored entry.
    fn clear(&self) -> Result<(), HostStoreError>;

    /// Make staged changes durable.
    fn flush(&self) -> Result<(), HostStoreError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_entry(n: u8) -> HostEntry {
    use crate::config::HostDbConfig;
    use crate::types::{HostDbEntry, PublicKey};

    let host = HostDbEntry::new(
        format!("host{n}.example.com:9982"),
        PublicKey::ed25519(vec![n; 32]),
    );
    HostEntry::new(host, u64::from(n), &HostDbConfig::default())
}
