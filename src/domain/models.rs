use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use url::Host;
use uuid::Uuid;

use super::{ProxyError, Result};

/// The `host:port` pair named by a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    /// Hostname or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl TunnelTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parses an authority-form request target such as `example.com:443` or `[::1]:8443`.
    pub fn parse(authority: &str) -> Result<Self> {
        let malformed = || ProxyError::MalformedTarget(authority.to_string());

        let (host, port) = authority.rsplit_once(':').ok_or_else(malformed)?;

        let host = match host.strip_prefix('[') {
            Some(v6) => v6.strip_suffix(']').ok_or_else(malformed)?,
            // A bare IPv6 literal has more colons but no brackets
            None if host.contains(':') => return Err(malformed()),
            None => host,
        };

        if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let port: u16 = port.parse().map_err(|_| malformed())?;
        if port == 0 {
            return Err(malformed());
        }

        let parsed = if authority.starts_with('[') {
            Host::parse(&format!("[{}]", host))
        } else {
            Host::parse(host)
        };
        let host = match parsed.map_err(|_| malformed())? {
            Host::Domain(domain) => domain,
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };

        Ok(Self { host, port })
    }
}

impl fmt::Display for TunnelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// First line of an HTTP/1.x request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    /// Protocol version without the `HTTP/` prefix, e.g. `1.1`.
    pub version: String,
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');

        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
            _ => return Err(ProxyError::MalformedRequest(format!("bad request line {:?}", line))),
        };

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
        })
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    /// Returns the numeric protocol version, rejecting anything that is not `HTTP/<digit>.<digit>`.
    pub fn http_version(&self) -> Result<&str> {
        let malformed = || ProxyError::MalformedRequest(format!("unsupported protocol {:?}", self.version));
        let number = self.version.strip_prefix("HTTP/").ok_or_else(malformed)?;
        match number.as_bytes() {
            [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => Ok(number),
            _ => Err(malformed()),
        }
    }
}

/// A parsed request head: request line plus header fields in arrival order.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub line: RequestLine,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An accepted CONNECT connection ready to be bridged.
pub struct TunnelRequest<S> {
    pub target: TunnelTarget,
    /// Bytes the client sent after the request head that were already buffered.
    pub initial_bytes: Bytes,
    pub client: S,
    pub peer: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Established,
    Streaming,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Established => write!(f, "established"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    /// Bytes forwarded from the client to the relay, initial bytes included.
    pub bytes_up: u64,
    /// Bytes forwarded from the relay response to the client.
    pub bytes_down: u64,
}

/// Which side finished a session that ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    RelayClosed,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: Uuid,
    pub end: SessionEnd,
    pub totals: SessionTotals,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub target: String,
    pub peer: Option<SocketAddr>,
    pub state: SessionState,
    pub totals: SessionTotals,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl SessionInfo {
    pub fn new(target: &TunnelTarget, peer: Option<SocketAddr>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.to_string(),
            peer,
            state: SessionState::Established,
            totals: SessionTotals::default(),
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self, totals: SessionTotals) {
        self.state = SessionState::Closed;
        self.totals = totals;
        self.closed_at = Some(Instant::now());
    }
}
