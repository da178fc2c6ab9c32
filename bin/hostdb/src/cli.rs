//! Command line arguments.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser};
use eyre::{Result, WrapErr, eyre};
use renter_hostdb::{HostDbEntry, NetAddress, PublicKey};

/// Run a renter host database: seed hosts, scan them, report the active set.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct HostDbCli {
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    /// TOML configuration file.
    #[arg(long, short = 'c', value_name = "FILE", env = "HOSTDB_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Host registry file. Loaded on startup, written on shutdown.
    #[arg(long, value_name = "FILE")]
    pub(crate) store: Option<PathBuf>,

    /// Seed host as `address@algorithm:hexkey`. May be repeated.
    #[arg(long = "host", value_name = "HOST")]
    pub(crate) hosts: Vec<SeedHost>,

    /// Accept loopback and private host addresses.
    #[arg(long)]
    pub(crate) allow_local: bool,

    /// Seconds between status reports.
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub(crate) status_interval: u64,
}

/// Logging configuration.
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output.
    #[arg(short, long)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbosity: u8,

    /// Log filter directive (e.g., "renter_hostdb=trace").
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    pub(crate) filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json")]
    pub(crate) json: bool,
}

/// A host given on the command line or in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeedHost {
    pub(crate) address: NetAddress,
    pub(crate) public_key: PublicKey,
}

impl From<SeedHost> for HostDbEntry {
    fn from(seed: SeedHost) -> Self {
        HostDbEntry::new(seed.address, seed.public_key)
    }
}

impl FromStr for SeedHost {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let (address, key) = s
            .split_once('@')
            .ok_or_else(|| eyre!("expected address@algorithm:hexkey, got {s:?}"))?;
        let public_key = key
            .parse()
            .wrap_err_with(|| format!("invalid public key for {address}"))?;
        Ok(Self {
            address: NetAddress::new(address),
            public_key,
        })
    }
}
