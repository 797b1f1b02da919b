//! Immutable per-run probe settings.

use std::time::Duration;
use thiserror::Error;

/// Conventional DoQ port.
pub const DOQ_PORT: u16 = 853;

/// Ports used by early DoQ deployments, tried in this order.
pub const LEGACY_DOQ_PORTS: [u16; 2] = [784, 8853];

/// DoQ draft identifiers advertised during the handshake, newest first.
pub const DEFAULT_ALPN: [&str; 7] = ["doq-i06", "doq-i05", "doq-i04", "doq-i03", "doq-i02", "doq-i01", "doq-i00"];

/// QUIC v1 followed by drafts 34, 32 and 29.
pub const QUIC_VERSIONS: [u32; 4] = [0x0000_0001, 0xff00_0022, 0xff00_0020, 0xff00_001d];

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_PARALLEL: usize = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no ports to probe")]
    NoPorts,
    #[error("invalid port: 0")]
    ZeroPort,
    #[error("no ALPN identifiers to advertise")]
    NoAlpn,
    #[error("ALPN identifier must be 1-255 bytes: {0:?}")]
    BadAlpn(String),
    #[error("handshake timeout must be non-zero")]
    ZeroTimeout,
    #[error("no QUIC versions configured")]
    NoQuicVersions,
}

/// Which port set a run probes. Exactly one set is used per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortSet {
    /// Only the conventional port 853.
    Standard,
    /// The two legacy ports, 784 then 8853.
    #[default]
    Legacy,
}

impl PortSet {
    pub fn from_port853_flag(port853: bool) -> Self {
        if port853 { PortSet::Standard } else { PortSet::Legacy }
    }

    pub fn ports(self) -> Vec<u16> {
        match self {
            PortSet::Standard => vec![DOQ_PORT],
            PortSet::Legacy => LEGACY_DOQ_PORTS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Candidate ports in the order they are tried.
    pub ports: Vec<u16>,
    /// ALPN identifiers in the order they are advertised.
    pub alpn: Vec<String>,
    pub handshake_timeout: Duration,
    /// First entry is the version used for the initial packet.
    pub quic_versions: Vec<u32>,
}

impl ProbeConfig {
    pub fn new(ports: PortSet) -> Self {
        ProbeConfig {
            ports: ports.ports(),
            alpn: DEFAULT_ALPN.iter().map(|s| s.to_string()).collect(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            quic_versions: QUIC_VERSIONS.to_vec(),
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    /// Advertise `extra` after the configured identifiers. Identifiers
    /// already in the list are not repeated.
    pub fn with_extra_alpn(mut self, extra: Vec<String>) -> Self {
        for id in extra {
            if !self.alpn.contains(&id) {
                self.alpn.push(id);
            }
        }
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::NoPorts);
        }
        if self.ports.contains(&0) {
            return Err(ConfigError::ZeroPort);
        }
        if self.alpn.is_empty() {
            return Err(ConfigError::NoAlpn);
        }
        if let Some(bad) = self.alpn.iter().find(|a| a.is_empty() || a.len() > 255) {
            return Err(ConfigError::BadAlpn(bad.clone()));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.quic_versions.is_empty() {
            return Err(ConfigError::NoQuicVersions);
        }
        Ok(())
    }

    /// Whether `proto` is one of the identifiers this run advertises.
    pub fn recognizes(&self, proto: &[u8]) -> bool {
        self.alpn.iter().any(|a| a.as_bytes() == proto)
    }

    pub(crate) fn alpn_wire(&self) -> Vec<Vec<u8>> {
        self.alpn.iter().map(|a| a.as_bytes().to_vec()).collect()
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig::new(PortSet::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_sets_never_mix() {
        assert_eq!(PortSet::from_port853_flag(true).ports(), vec![853]);
        assert_eq!(PortSet::from_port853_flag(false).ports(), vec![784, 8853]);
    }

    #[test]
    fn defaults_match_doq_drafts() {
        let cfg = ProbeConfig::default();
        assert_eq!(cfg.alpn.first().map(String::as_str), Some("doq-i06"));
        assert_eq!(cfg.alpn.last().map(String::as_str), Some("doq-i00"));
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(2));
        assert_eq!(cfg.quic_versions[0], 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn recognizes_only_advertised_ids() {
        let cfg = ProbeConfig::default();
        assert!(cfg.recognizes(b"doq-i02"));
        assert!(!cfg.recognizes(b"doq"));
        assert!(!cfg.recognizes(b"h3"));
    }

    #[test]
    fn extra_alpn_keeps_the_drafts() {
        let cfg = ProbeConfig::default().with_extra_alpn(vec!["doq".into(), "doq-i02".into(), "doq".into()]);
        assert_eq!(cfg.alpn.len(), DEFAULT_ALPN.len() + 1);
        assert_eq!(cfg.alpn[..DEFAULT_ALPN.len()], DEFAULT_ALPN.map(String::from));
        assert_eq!(cfg.alpn.last().map(String::as_str), Some("doq"));
        assert!(cfg.recognizes(b"doq"));
        assert!(cfg.recognizes(b"doq-i00"));
    }

    #[test]
    fn reject_invalid() {
        assert_eq!(ProbeConfig::default().with_ports(vec![]).validate(), Err(ConfigError::NoPorts));
        assert_eq!(ProbeConfig::default().with_ports(vec![853, 0]).validate(), Err(ConfigError::ZeroPort));
        assert_eq!(ProbeConfig { alpn: vec![], ..Default::default() }.validate(), Err(ConfigError::NoAlpn));
        assert_eq!(
            ProbeConfig::default().with_extra_alpn(vec![String::new()]).validate(),
            Err(ConfigError::BadAlpn(String::new()))
        );
        assert_eq!(
            ProbeConfig::default().with_handshake_timeout(Duration::ZERO).validate(),
            Err(ConfigError::ZeroTimeout)
        );
    }
}
