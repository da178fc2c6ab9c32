//! Probe errors and a TCP reachability prober.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::trace;

use crate::traits::{HostProber, ProbeResult};
use crate::types::{NetAddress, PublicKey};

/// Reason a probe failed. Every variant counts as a failed scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("connection refused")]
    Refused,
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProbeError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::Unreachable(_) => "unreachable",
            Self::Protocol(_) => "protocol",
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => Self::Refused,
            std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Unreachable(e.to_string()),
        }
    }
}

/// Considers a host alive if a TCP connection to its address succeeds.
///
/// No application handshake is performed, so settings are never refreshed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl HostProber for TcpProber {
    async fn probe(
        &self,
        address: &NetAddress,
        _public_key: &PublicKey,
        timeout: Duration,
    ) -> ProbeResult {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address.as_str()))
            .await
            .map_err(|_| ProbeError::Timeout)??;
        trace!(%address, peer = ?stream.peer_addr().ok(), "tcp probe connected");
        Ok(None)
    }
}
