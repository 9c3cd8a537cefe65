use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Port an agent listens on when none is given.
pub const DEFAULT_PORT: u16 = 25252;

/// Where an agent listens or a controller connects.
///
/// Textual forms accepted by [`FromStr`]:
/// - `tcp://host:port` or a bare `host:port`
/// - `unix:/path/to.sock`, `unix:///path/to.sock`, or a bare absolute/relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A `host:port` pair, resolved at bind/connect time.
    Tcp(String),
    /// A filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint on the loopback interface.
    pub fn localhost(port: u16) -> Self {
        Self::Tcp(format!("127.0.0.1:{port}"))
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix(_) => "unix-domain-socket",
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::localhost(DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "endpoint must not be empty"));
        }

        if let Some(addr) = trimmed.strip_prefix("tcp://") {
            return parse_tcp(input, addr);
        }
        if let Some(path) = trimmed.strip_prefix("unix:") {
            let path = path.strip_prefix("//").unwrap_or(path);
            if path.is_empty() {
                return Err(invalid(input, "unix endpoint needs a path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if trimmed.contains("://") {
            return Err(invalid(input, "unsupported scheme (expected tcp:// or unix:)"));
        }
        if trimmed.starts_with('/') || trimmed.starts_with('.') {
            return Ok(Self::Unix(PathBuf::from(trimmed)));
        }
        parse_tcp(input, trimmed)
    }
}

fn parse_tcp(input: &str, addr: &str) -> Result<Endpoint, TransportError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid(input, "tcp endpoint needs host:port"))?;
    if host.is_empty() {
        return Err(invalid(input, "tcp endpoint needs a host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid(input, "tcp port must be a number in 0-65535"))?;
    Ok(Endpoint::Tcp(addr.to_string()))
}

fn invalid(input: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_forms() {
        assert_eq!(
            "tcp://127.0.0.1:25252".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:25252".into())
        );
        assert_eq!(
            "localhost:9000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("localhost:9000".into())
        );
    }

    #[test]
    fn parses_unix_forms() {
        let expected = Endpoint::Unix(PathBuf::from("/tmp/agent.sock"));
        assert_eq!("unix:/tmp/agent.sock".parse::<Endpoint>().unwrap(), expected);
        assert_eq!("unix:///tmp/agent.sock".parse::<Endpoint>().unwrap(), expected);
        assert_eq!("/tmp/agent.sock".parse::<Endpoint>().unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in ["", "tcp://nohost", "tcp://:80", "tcp://host:port", "udp://x:1", "unix:"] {
            let err = bad.parse::<Endpoint>().unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for ep in [
            Endpoint::default(),
            Endpoint::Unix(PathBuf::from("/run/agent.sock")),
        ] {
            assert_eq!(ep.to_string().parse::<Endpoint>().unwrap(), ep);
        }
    }
}
