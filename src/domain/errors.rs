use std::fmt;

/// Errors raised while accepting, bridging or configuring tunnels.
///
/// Everything except `Bind` and `Config` is scoped to a single connection:
/// the affected client is closed and the listener keeps accepting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    MalformedTarget(String),
    MalformedRequest(String),
    RelayUnreachable(String),
    RelayRejected(u16),
    ClientAbort(String),
    RelayStreamError(String),
    Config(String),
    Bind(String),
    Io(String),
}

impl ProxyError {
    /// Short stable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedTarget(_) => "malformed_target",
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::RelayUnreachable(_) => "relay_unreachable",
            ProxyError::RelayRejected(_) => "relay_rejected",
            ProxyError::ClientAbort(_) => "client_abort",
            ProxyError::RelayStreamError(_) => "relay_stream_error",
            ProxyError::Config(_) => "config",
            ProxyError::Bind(_) => "bind",
            ProxyError::Io(_) => "io",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ProxyError::Bind(_) | ProxyError::Config(_))
    }

    /// Errors that the client should see as `400 Bad Request`.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, ProxyError::MalformedTarget(_) | ProxyError::MalformedRequest(_))
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::MalformedTarget(msg) => write!(f, "Malformed CONNECT target: {}", msg),
            ProxyError::MalformedRequest(msg) => write!(f, "Malformed request: {}", msg),
            ProxyError::RelayUnreachable(msg) => write!(f, "Relay unreachable: {}", msg),
            ProxyError::RelayRejected(status) => write!(f, "Relay rejected tunnel with status {}", status),
            ProxyError::ClientAbort(msg) => write!(f, "Client aborted: {}", msg),
            ProxyError::RelayStreamError(msg) => write!(f, "Relay stream error: {}", msg),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProxyError::Bind(msg) => write!(f, "Failed to bind listener: {}", msg),
            ProxyError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
