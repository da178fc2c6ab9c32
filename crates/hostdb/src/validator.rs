//! Address validation for discovered hosts.
//!
//! Malformed addresses are always rejected. Loopback, private, link-local
//! and unspecified addresses are rejected unless local addresses are
//! allowed, which is how test networks run.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::traits::AddressValidator;
use crate::types::NetAddress;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetAddressError {
    #[error("address is missing a port")]
    MissingPort,
    #[error("invalid port")]
    InvalidPort,
    #[error("address has an empty host")]
    EmptyHost,
    #[error("invalid hostname")]
    InvalidHostname,
    #[error("local address not allowed: {0}")]
    Local(IpAddr),
    #[error("loopback hostname not allowed")]
    LocalHostname,
}

/// Default validator: syntax checks plus an optional local-address filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardValidator {
    allow_local: bool,
}

impl StandardValidator {
    pub fn new(allow_local: bool) -> Self {
        Self { allow_local }
    }
}

impl AddressValidator for StandardValidator {
    fn validate(&self, address: &NetAddress) -> Result<(), NetAddressError> {
        let (raw_host, port) = address
            .as_str()
            .rsplit_once(':')
            .ok_or(NetAddressError::MissingPort)?;
        match port.parse::<u16>() {
            Ok(0) | Err(_) => return Err(NetAddressError::InvalidPort),
            Ok(_) => {}
        }

        let host = address.host().ok_or(NetAddressError::MissingPort)?;
        if host.is_empty() {
            return Err(NetAddressError::EmptyHost);
        }
        // IPv6 literals must be bracketed so the port separator is unambiguous.
        if host.contains(':') && !raw_host.starts_with('[') {
            return Err(NetAddressError::InvalidHostname);
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            if !self.allow_local && is_local_ip(ip) {
                return Err(NetAddressError::Local(ip));
            }
            return Ok(());
        }

        if !is_valid_hostname(host) {
            return Err(NetAddressError::InvalidHostname);
        }
        if !self.allow_local && host.eq_ignore_ascii_case("localhost") {
            return Err(NetAddressError::LocalHostname);
        }
        Ok(())
    }
}

fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// True for addresses that are not reachable from the public internet.
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_ipv4(v4),
        IpAddr::V6(v6) => is_local_ipv6(v6),
    }
}

fn is_local_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_local_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_local_ipv4(v4);
    }
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_unique_local()
        || ip.is_unicast_link_local()
}
