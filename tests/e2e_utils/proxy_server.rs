#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

use relayproxy::adapters::{ProxyListener, ReqwestRelayClient, SessionTracker};
use relayproxy::config::Config;
use relayproxy::domain::TunnelBridge;
use relayproxy::ports::TrackingPort;

pub const TEST_UUID: &str = "6f1c1c2e-test-tunnel";

/// The real listener, bridge and relay client on an ephemeral port.
pub struct TestProxyServer {
    addr: SocketAddr,
    tracker: Arc<SessionTracker>,
    _server_handle: JoinHandle<()>,
}

impl TestProxyServer {
    pub async fn start(relay_url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Arc::new(Config::new(0, Url::parse(relay_url)?, TEST_UUID)?);

        let tracker = Arc::new(SessionTracker::new());
        let tracker_port: Arc<dyn TrackingPort> = tracker.clone();

        let relay = Arc::new(ReqwestRelayClient::new(&config)?);
        let bridge = Arc::new(TunnelBridge::new(config.clone(), relay, tracker_port));

        let listener = ProxyListener::bind(config, bridge).await?;
        let addr = listener.local_addr()?;

        let server_handle = tokio::spawn(async move {
            let _ = listener.run().await;
        });

        Ok(Self {
            addr,
            tracker,
            _server_handle: server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn active_sessions(&self) -> usize {
        self.tracker.active_sessions().await.map(|s| s.len()).unwrap_or(0)
    }
}
