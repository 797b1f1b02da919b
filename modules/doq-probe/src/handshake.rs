use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

/// Why one handshake attempt failed. The probe treats every variant the same
/// way: move on to the next port.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("handshake timed out")]
    Timeout,
    #[error("connect setup failed: {0}")]
    Connect(#[from] quinn::ConnectError),
    #[error("handshake failed: {0}")]
    Connection(#[from] quinn::ConnectionError),
    #[error("peer selected unadvertised ALPN {0:?}")]
    AlpnMismatch(String),
    #[error("no QUIC version to dial")]
    NoQuicVersion,
    #[error("peer did not negotiate an application protocol")]
    NoAlpn,
    #[error("tls setup: {0}")]
    Tls(#[from] rustls::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A completed handshake. The session behind it is already closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Identifier the peer picked from the advertised list.
    pub alpn: Option<String>,
}

/// Establishes one secured transport session and tears it down again.
#[async_trait]
pub trait Handshaker: Send + Sync {
    async fn handshake(&self, addr: SocketAddr) -> Result<Handshake, ProbeError>;
}
