//! TCP endpoint addressing.
//!
//! An [`Endpoint`] names where a connector dials or where a listener binds.
//! A missing address means "any" and is only meaningful for listeners.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCHEME: &str = "tcp://";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// Immutable (address, port) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    address: Option<IpAddr>,
    port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address: Some(address),
            port,
        }
    }

    /// An endpoint bound to every local address.
    #[must_use]
    pub fn any(port: u16) -> Self {
        Self {
            address: None,
            port,
        }
    }

    /// The address, or `None` for the wildcard.
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Socket address to bind to. The wildcard resolves to `0.0.0.0`.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            self.port,
        )
    }

    /// Socket address to dial. `None` for the wildcard, which cannot be dialed.
    pub fn dial_addr(&self) -> Option<SocketAddr> {
        self.address.map(|address| SocketAddr::new(address, self.port))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Accepts `address:port`, `[v6]:port`, or a bare `port`, optionally
    /// prefixed with `tcp://`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix(SCHEME).unwrap_or(s);

        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(addr.into());
        }

        match s.rsplit_once(':') {
            Some((host, port)) => {
                let host = host.trim();
                let bare = host
                    .strip_prefix('[')
                    .and_then(|h| h.strip_suffix(']'))
                    .unwrap_or(host);
                // An unbracketed v6 address has no unambiguous port separator.
                if bare.contains(':') && bare.len() == host.len() {
                    return Err(EndpointError::InvalidAddress(host.to_string()));
                }
                let address = bare
                    .parse::<IpAddr>()
                    .map_err(|_| EndpointError::InvalidAddress(host.to_string()))?;
                Ok(Self::new(address, parse_port(port)?))
            }
            None => Ok(Self::any(parse_port(s)?)),
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.dial_addr() {
            Some(addr) => write!(f, "{SCHEME}{addr}"),
            None => write!(f, "{SCHEME}{}", self.port),
        }
    }
}

fn parse_port(s: &str) -> Result<u16, EndpointError> {
    let s = s.trim();
    s.parse()
        .map_err(|_| EndpointError::InvalidPort(s.to_string()))
}
