use crate::config::ProbeConfig;
use crate::handshake::{Handshaker, ProbeError};
use doqscan_core::Target;
use std::net::SocketAddr;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Reachable { port: u16, alpn: Option<String> },
    Unreachable,
}

impl Verdict {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Verdict::Reachable { .. })
    }
}

/// Try each configured port in order until one completes a DoQ handshake.
///
/// Ports are attempted one at a time and at most once; each attempt is cut
/// off after the configured handshake timeout. Any failure just moves on to
/// the next port.
pub async fn probe<H>(handshaker: &H, config: &ProbeConfig, target: Target) -> Verdict
where
    H: Handshaker + ?Sized,
{
    debug_assert!(!config.ports.is_empty(), "probe config without ports");
    for &port in &config.ports {
        let addr = SocketAddr::from((target.ip(), port));
        let attempt = match timeout(config.handshake_timeout, handshaker.handshake(addr)).await {
            Ok(res) => res,
            Err(_) => Err(ProbeError::Timeout),
        };
        match attempt {
            Ok(hs) => {
                debug!(%addr, alpn = ?hs.alpn, "doq handshake completed");
                return Verdict::Reachable { port, alpn: hs.alpn };
            }
            Err(e) => debug!(%addr, error = %e, "doq handshake failed"),
        }
    }
    Verdict::Unreachable
}
