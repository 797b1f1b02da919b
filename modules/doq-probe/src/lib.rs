//! DNS-over-QUIC reachability probing: QUIC handshakes advertising the DoQ
//! ALPN identifiers, tried port by port, dispatched under a concurrency bound.

pub mod config;
pub mod handshake;
pub mod probe;
pub mod quic;
pub mod scan;

pub use config::{ConfigError, PortSet, ProbeConfig};
pub use handshake::{Handshake, Handshaker, ProbeError};
pub use probe::{probe, Verdict};
pub use quic::QuicHandshaker;
pub use scan::{scan, ScanSummary};
