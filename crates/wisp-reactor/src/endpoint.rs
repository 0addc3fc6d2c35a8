//! `IpEndpoint` — a thin, round-trippable wrapper over [`std::net::SocketAddr`].
//! `std::net::SocketAddr`'s own `Display`/`FromStr` already produce exactly
//! the wire forms BSD socket addressing requires (`a.b.c.d:port` for
//! IPv4, `[addr]:port` for IPv6); this type
//! exists so the rest of the reactor has one spelling to pass around
//! rather than reaching for `std::net` directly at every call site, and so
//! malformed input is rejected through this crate's [`wisp_core::Error`]
//! taxonomy instead of `std::net::AddrParseError`.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use wisp_core::error::{categories, Code, Error};
use wisp_core::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IpEndpoint(SocketAddr);

impl IpEndpoint {
    pub fn new(addr: SocketAddr) -> Self {
        IpEndpoint(addr)
    }

    pub fn from_str(s: &str) -> Result<Self> {
        SocketAddr::from_str(s)
            .map(IpEndpoint)
            .map_err(|e| Error::new(categories::SOCKET, Code::InvalidArgument).with_source(e))
    }

    pub fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for IpEndpoint {
    fn from(addr: SocketAddr) -> Self {
        IpEndpoint(addr)
    }
}

impl From<IpEndpoint> for SocketAddr {
    fn from(ep: IpEndpoint) -> Self {
        ep.0
    }
}

impl fmt::Display for IpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_round_trips() {
        let ep = IpEndpoint::from_str("127.0.0.1:8080").unwrap();
        assert_eq!(IpEndpoint::from_str(&ep.to_string()).unwrap(), ep);
    }

    #[test]
    fn ipv6_round_trips() {
        let ep = IpEndpoint::from_str("[::1]:8080").unwrap();
        assert_eq!(ep.to_string(), "[::1]:8080");
        assert_eq!(IpEndpoint::from_str(&ep.to_string()).unwrap(), ep);
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        assert!(IpEndpoint::from_str("not-an-endpoint").is_err());
    }
}
