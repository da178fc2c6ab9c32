//! Host identity, pricing and settings types shared across the host database.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Logical chain height, used to stamp when a host was first discovered.
pub type BlockHeight = u64;

/// Network location of a host in `host:port` form.
///
/// IPv6 hosts are written in brackets (`[::1]:9982`). The address is the
/// registry key; validity is checked by an [`AddressValidator`](crate::AddressValidator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetAddress(String);

impl NetAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part without the port. Brackets around IPv6 literals are stripped.
    pub fn host(&self) -> Option<&str> {
        let (host, _) = self.0.rsplit_once(':')?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        Some(host)
    }

    pub fn port(&self) -> Option<u16> {
        let (_, port) = self.0.rsplit_once(':')?;
        port.parse().ok()
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NetAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Long-lived cryptographic identity of a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: String,
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(key: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm: "ed25519".to_string(),
            key: key.into(),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, hex::encode(&self.key))
    }
}

/// Error parsing a `algorithm:hexkey` public key string.
#[derive(Debug, thiserror::Error)]
pub enum PublicKeyParseError {
    #[error("missing algorithm prefix")]
    MissingAlgorithm,
    #[error("invalid key encoding: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for PublicKey {
    type Err = PublicKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, key) = s
            .split_once(':')
            .ok_or(PublicKeyParseError::MissingAlgorithm)?;
        Ok(Self {
            algorithm: algorithm.to_string(),
            key: hex::decode(key)?,
        })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Amount of money in the smallest currency unit.
///
/// Arithmetic saturates instead of wrapping. Serialized as a decimal string
/// so values above 2^53 survive JSON round trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(u128);

impl Currency {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub const fn saturating_mul(self, other: Self) -> Self {
        Self(self.0.saturating_mul(other.0))
    }

    /// Integer division. Division by zero yields zero.
    pub const fn div(self, divisor: u128) -> Self {
        match self.0.checked_div(divisor) {
            Some(v) => Self(v),
            None => Self(0),
        }
    }
}

impl Add for Currency {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Currency {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::iter::Sum for Currency {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<u128> for Currency {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<u64> for Currency {
    fn from(v: u64) -> Self {
        Self(u128::from(v))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Currency {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Terms advertised by a host.
///
/// The host database stores and forwards these. Only the prices feed into
/// host weight and the average price statistic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub accepting_contracts: bool,
    pub max_duration: BlockHeight,
    pub total_storage: u64,
    pub remaining_storage: u64,
    pub contract_price: Currency,
    pub storage_price: Currency,
    pub collateral: Currency,
    pub upload_bandwidth_price: Currency,
    pub download_bandwidth_price: Currency,
}

/// A host as seen by consumers: identity plus advertised settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDbEntry {
    pub net_address: NetAddress,
    pub public_key: PublicKey,
    #[serde(default)]
    pub settings: HostSettings,
}

impl HostDbEntry {
    pub fn new(net_address: impl Into<NetAddress>, public_key: PublicKey) -> Self {
        Self {
            net_address: net_address.into(),
            public_key,
            settings: HostSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: HostSettings) -> Self {
        self.settings = settings;
        self
    }
}
