//! Core building blocks for the DoQ batch probe: targets, the input feed,
//! the admission controller and the result sink.

use std::fmt;
use std::net::Ipv4Addr;

pub mod admission;
pub mod feed;
pub mod sink;

pub use admission::{AdmissionController, Ticket};
pub use feed::TargetFeed;
pub use sink::{Recorder, ResultSink, SinkStats};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// One IPv4 address to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target(pub Ipv4Addr);

impl Target {
    /// Parse one input line. Only dotted-decimal IPv4 literals are accepted.
    pub fn parse(line: &str) -> Option<Target> {
        line.trim().parse::<Ipv4Addr>().ok().map(Target)
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for Target {
    fn from(ip: Ipv4Addr) -> Self {
        Target(ip)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn parses_ipv4_literals() {
        assert_eq!(Target::parse("10.0.0.1"), Some(Target(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(Target::parse("  192.0.2.7\r"), Some(Target(Ipv4Addr::new(192, 0, 2, 7))));
    }

    #[test]
    fn rejects_everything_else() {
        for line in ["not-an-ip", "::1", "::ffff:10.0.0.1", "10.0.0", "10.0.0.256", "", "# comment", "010.0.0.1"] {
            assert_eq!(Target::parse(line), None, "{line:?} should be rejected");
        }
    }

    #[test]
    fn displays_dotted_decimal() {
        assert_eq!(Target(Ipv4Addr::new(8, 8, 4, 4)).to_string(), "8.8.4.4");
    }
}
