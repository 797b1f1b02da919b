//! QUIC handshaker backed by quinn and rustls.

use crate::config::ProbeConfig;
use crate::handshake::{Handshake, Handshaker, ProbeError};
use async_trait::async_trait;
use quinn::crypto::rustls::{HandshakeData, QuicClientConfig};
use quinn::{
    ClientConfig, Connection, ConnectionError, Endpoint, EndpointConfig, IdleTimeout, TokioRuntime, TransportConfig,
    VarInt,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{debug, trace};

/// Dials DoQ candidates from a single client endpoint.
///
/// All probes share one UDP socket, so the number of open descriptors does
/// not grow with the parallelism limit.
pub struct QuicHandshaker {
    endpoint: Endpoint,
    /// One client config per QUIC version, in preference order.
    clients: Vec<(u32, ClientConfig)>,
    config: ProbeConfig,
}

impl QuicHandshaker {
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        Self::bind(config, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
    }

    pub fn bind(config: &ProbeConfig, local: SocketAddr) -> Result<Self, ProbeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth();
        tls.alpn_protocols = config.alpn_wire();
        let crypto = Arc::new(QuicClientConfig::try_from(tls).map_err(io::Error::other)?);

        let mut transport = TransportConfig::default();
        transport.max_idle_timeout(IdleTimeout::try_from(config.handshake_timeout).ok());
        let transport = Arc::new(transport);
        let clients = config
            .quic_versions
            .iter()
            .map(|&version| {
                let mut client = ClientConfig::new(crypto.clone());
                client.transport_config(transport.clone());
                client.version(version);
                (version, client)
            })
            .collect();

        // The endpoint refuses to dial versions it does not list as supported.
        let mut endpoint_config = EndpointConfig::default();
        endpoint_config.supported_versions(config.quic_versions.clone());
        let socket = UdpSocket::bind(local)?;
        let endpoint = Endpoint::new(endpoint_config, None, socket, Arc::new(TokioRuntime))?;
        debug!(local = ?endpoint.local_addr().ok(), "quic endpoint ready");

        Ok(QuicHandshaker { endpoint, clients, config: config.clone() })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Let close frames of finished sessions go out before the process exits.
    pub async fn shutdown(&self) {
        if tokio::time::timeout(self.config.handshake_timeout, self.endpoint.wait_idle()).await.is_err() {
            debug!("quic endpoint still busy at shutdown");
        }
    }

    /// Dial `addr`, stepping down the version list each time the peer answers
    /// with a version negotiation packet.
    async fn connect(&self, addr: SocketAddr) -> Result<Connection, ProbeError> {
        // An IP literal yields an IP server name, so no SNI goes on the wire.
        let server_name = addr.ip().to_string();
        let mut last = ProbeError::NoQuicVersion;
        for (version, client) in &self.clients {
            match self.endpoint.connect_with(client.clone(), addr, &server_name)?.await {
                Ok(conn) => return Ok(conn),
                Err(ConnectionError::VersionMismatch) => {
                    trace!(%addr, version = format_args!("{version:#010x}"), "version rejected by peer");
                    last = ProbeError::Connection(ConnectionError::VersionMismatch);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last)
    }
}

#[async_trait]
impl Handshaker for QuicHandshaker {
    async fn handshake(&self, addr: SocketAddr) -> Result<Handshake, ProbeError> {
        let conn = self.connect(addr).await?;
        let protocol = conn
            .handshake_data()
            .and_then(|data| data.downcast::<HandshakeData>().ok())
            .and_then(|data| data.protocol);
        conn.close(VarInt::from_u32(0), b"");
        trace!(%addr, "session closed");

        match protocol {
            Some(p) if self.config.recognizes(&p) => {
                Ok(Handshake { alpn: Some(String::from_utf8_lossy(&p).into_owned()) })
            }
            Some(p) => Err(ProbeError::AlpnMismatch(String::from_utf8_lossy(&p).into_owned())),
            None => Err(ProbeError::NoAlpn),
        }
    }
}

/// Accepts any certificate chain. Handshake signatures are still checked, so
/// a completed handshake means the peer holds the key it presented.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
