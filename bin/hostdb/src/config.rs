//! TOML configuration file.

use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use renter_hostdb::HostDbConfig;
use serde::{Deserialize, Serialize};

use crate::cli::SeedHost;

/// On-disk configuration. Command line flags override it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub(crate) hostdb: HostDbConfig,
    /// Host registry file.
    pub(crate) store: Option<PathBuf>,
    pub(crate) hosts: Vec<SeedHostConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SeedHostConfig {
    pub(crate) address: String,
    /// `algorithm:hexkey`
    pub(crate) public_key: String,
}

impl FileConfig {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
    }

    pub(crate) fn seed_hosts(&self) -> Result<Vec<SeedHost>> {
        self.hosts
            .iter()
            .map(|h| format!("{}@{}", h.address, h.public_key).parse())
            .collect()
    }
}
