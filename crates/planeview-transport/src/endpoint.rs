use std::fmt;
use std::net::TcpListener;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// A `(host, port)` pair a channel listens on or connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint on the default loopback host.
    pub fn localhost(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }

    /// Endpoint on `host` with an ephemeral port picked by the OS.
    pub fn ephemeral(host: impl Into<String>) -> Result<Self> {
        let host = host.into();
        let port = free_port(&host)?;
        Ok(Self { host, port })
    }

    /// `host:port` form accepted by the socket APIs.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidEndpoint(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Ask the OS for a currently unused TCP port on `host`.
///
/// The port is released before returning, so another process may claim it
/// before the caller binds. Callers should treat a later bind failure as
/// retryable.
pub fn free_port(host: &str) -> Result<u16> {
    let probe = Endpoint::new(host, 0);
    let listener = TcpListener::bind(probe.authority()).map_err(|source| TransportError::Bind {
        endpoint: probe.clone(),
        source,
    })?;
    let port = listener.local_addr()?.port();
    debug!(host, port, "found free port");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let endpoint: Endpoint = "localhost:8765".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("localhost", 8765));
        assert_eq!(endpoint.to_string(), "localhost:8765");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let endpoint: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.authority(), "[::1]:9000");
    }

    #[test]
    fn rejects_missing_port() {
        assert!(matches!(
            "localhost".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            "localhost:http".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            ":80".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn free_port_is_bindable() {
        let port = free_port(DEFAULT_HOST).unwrap();
        assert_ne!(port, 0);
        let listener = TcpListener::bind(Endpoint::localhost(port).authority());
        assert!(listener.is_ok());
    }
}
