use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use crate::config::Config;
use crate::domain::{ProxyError, Result};
use crate::ports::{RelayPort, RelayRequest, RelayResponse};

/// Relay client backed by a single shared `reqwest::Client`.
pub struct ReqwestRelayClient {
    client: reqwest::Client,
}

impl ReqwestRelayClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            // The relay is always contacted directly
            .no_proxy()
            .connect_timeout(config.relay_connect_timeout)
            // Idle connections are never reused, each tunnel owns its relay connection
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl RelayPort for ReqwestRelayClient {
    async fn open(&self, request: RelayRequest) -> Result<RelayResponse> {
        let RelayRequest { url, headers, body } = request;

        let mut builder = self.client.post(url.as_str());
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| ProxyError::RelayUnreachable(format!("POST {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        log::debug!("relay {} answered {}", url, status);

        let body = response
            .bytes_stream()
            .map_err(|e| ProxyError::RelayStreamError(e.to_string()))
            .boxed();

        Ok(RelayResponse { status, body })
    }
}
