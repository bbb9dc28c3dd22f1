use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::domain::{ProxyError, Result};

pub const DEFAULT_PORT: &str = "8134";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved runtime configuration.
///
/// Built once before the listener starts and shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: IpAddr,
    pub listen_port: u16,
    pub relay_address: Url,
    pub tunnel_id: String,
    pub relay_connect_timeout: Duration,
    pub request_head_timeout: Duration,
}

impl Config {
    pub fn new(listen_port: u16, relay_address: Url, tunnel_id: impl Into<String>) -> Result<Self> {
        let tunnel_id = tunnel_id.into().trim().to_string();
        if tunnel_id.is_empty() {
            return Err(ProxyError::Config("tunnel uuid must not be empty".into()));
        }

        match relay_address.scheme() {
            "http" | "https" if relay_address.has_host() => {}
            _ => {
                return Err(ProxyError::Config(format!(
                    "relay address must be an http(s) URL, got {}",
                    relay_address
                )))
            }
        }

        Ok(Self {
            listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port,
            relay_address,
            tunnel_id,
            relay_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_head_timeout: DEFAULT_HEAD_TIMEOUT,
        })
    }

    pub fn with_listen_host(mut self, host: IpAddr) -> Self {
        self.listen_host = host;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.relay_connect_timeout = timeout;
        self
    }

    pub fn with_head_timeout(mut self, timeout: Duration) -> Self {
        self.request_head_timeout = timeout;
        self
    }
}

/// On-disk configuration, kept string-typed for compatibility with existing `config.json` files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub port: String,
    pub address: String,
    pub uuid: String,
}

impl StoredConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProxyError::Config(format!("config file {} does not exist", path.display())));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProxyError::Config(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ProxyError::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    pub fn resolve(&self) -> Result<Config> {
        let port = self
            .port
            .trim()
            .parse::<u16>()
            .map_err(|e| ProxyError::Config(format!("invalid port {:?}: {}", self.port, e)))?;

        let address = Url::parse(self.address.trim())
            .map_err(|e| ProxyError::Config(format!("invalid relay address {:?}: {}", self.address, e)))?;

        Config::new(port, address, self.uuid.as_str())
    }
}
