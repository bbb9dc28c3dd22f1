use crate::domain::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

/// Request body: client bytes in arrival order. An `Err` item aborts the request.
pub type UploadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Response body as it arrives from the relay.
pub type DownloadStream = BoxStream<'static, Result<Bytes>>;

pub struct RelayRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: UploadStream,
}

pub struct RelayResponse {
    pub status: u16,
    pub body: DownloadStream,
}

impl RelayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Port for the outbound HTTP request that carries one tunnel
#[async_trait]
pub trait RelayPort: Send + Sync {
    /// Send a streaming POST to the relay.
    ///
    /// Resolves once response headers are received; the request body keeps
    /// streaming afterwards. Dropping the returned response aborts the exchange.
    async fn open(&self, request: RelayRequest) -> Result<RelayResponse>;
}
