use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::entry::HostEntry;
use crate::types::NetAddress;

use super::{HostStore, HostStoreError};

/// Host snapshot kept as a JSON array on disk.
///
/// Changes are staged in memory and written by [`HostStore::flush`] through a
/// temporary file that is renamed over the target, so a crash mid-write
/// leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileHostStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<NetAddress, HostEntry>>,
    dirty: AtomicBool,
}

impl FileHostStore {
    /// Open `path`, reading it if it exists.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, HostStoreError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Vec<HostEntry>>(&bytes)?
                .into_iter()
                .map(|e| (e.net_address().clone(), e))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = entries.len(), "opened host store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
        })
    }

    /// Like [`FileHostStore::new`], creating missing parent directories first.
    pub fn new_with_create_dir(path: impl Into<PathBuf>) -> Result<Self, HostStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self) -> Result<(), HostStoreError> {
        let bytes = {
            let entries = self.entries.lock();
            serde_json::to_vec_pretty(&entries.values().collect::<Vec<_>>())?
        };
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl HostStore for FileHostStore {
    fn load_all(&self) -> Result<Vec<HostEntry>, HostStoreError> {
        Ok(self.entries.lock().values().cloned().collect())
    }

    fn save_batch(&self, entries: &[HostEntry]) -> Result<(), HostStoreError> {
        self.entries
            .lock()
            .extend(entries.iter().map(|e| (e.net_address().clone(), e.clone())));
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn clear(&self) -> Result<(), HostStoreError> {
        self.entries.lock().clear();
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn flush(&self) -> Result<(), HostStoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.write_snapshot()
            .inspect_err(|_| self.dirty.store(true, Ordering::Release))
    }
}
