use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::head::{read_request_head, reply_and_close, BAD_REQUEST};
use super::passthrough;
use crate::config::Config;
use crate::domain::{ProxyError, RequestHead, Result, TunnelBridge, TunnelRequest, TunnelTarget};

/// Pause after a failed accept, e.g. when the process is out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts proxy clients and dispatches CONNECT requests to the tunnel bridge.
pub struct ProxyListener {
    config: Arc<Config>,
    bridge: Arc<TunnelBridge>,
    listener: TcpListener,
}

impl ProxyListener {
    /// Binds `config.listen_host:config.listen_port`. A bind failure is fatal.
    pub async fn bind(config: Arc<Config>, bridge: Arc<TunnelBridge>) -> Result<Self> {
        let addr = SocketAddr::new(config.listen_host, config.listen_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Bind(format!("{}: {}", addr, e)))?;

        Ok(Self {
            config,
            bridge,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until the process is stopped.
    pub async fn run(self) -> Result<()> {
        info!("Server running at http://{}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let config = self.config.clone();
            let bridge = self.bridge.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, Some(peer), &config, &bridge).await {
                    debug!(peer = %peer, kind = e.kind(), "connection closed with error: {}", e);
                }
            });
        }
    }
}

/// Serves one accepted client connection.
pub async fn handle_connection<S>(
    stream: S,
    peer: Option<SocketAddr>,
    config: &Config,
    bridge: &TunnelBridge,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut reader = BufReader::new(stream);

    let head = match timeout(config.request_head_timeout, read_request_head(&mut reader)).await {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => {
            warn!(peer = ?peer, kind = e.kind(), "client error: {}", e);
            if e.is_bad_request() {
                reply_and_close(reader.get_mut(), BAD_REQUEST).await;
            }
            return Err(e);
        }
        Err(_) => {
            let e = ProxyError::MalformedRequest("timed out waiting for request head".into());
            warn!(peer = ?peer, kind = e.kind(), "client error: {}", e);
            reply_and_close(reader.get_mut(), BAD_REQUEST).await;
            return Err(e);
        }
    };

    if !head.line.is_connect() {
        return passthrough::forward(head, reader).await;
    }

    let (target, version) = match connect_target(&head) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(peer = ?peer, kind = e.kind(), "rejecting CONNECT {}: {}", head.line.target, e);
            reply_and_close(reader.get_mut(), BAD_REQUEST).await;
            return Err(e);
        }
    };

    // Whatever the client pipelined behind the head belongs to the tunnel
    let initial_bytes = Bytes::copy_from_slice(reader.buffer());
    let mut client = reader.into_inner();

    debug!(
        peer = ?peer,
        "Client connected to proxy, http version {}, target {}, {} early bytes",
        version,
        target,
        initial_bytes.len()
    );

    client
        .write_all(connection_established(&version).as_bytes())
        .await
        .map_err(|e| ProxyError::ClientAbort(format!("failed to acknowledge CONNECT {}: {}", target, e)))?;

    bridge
        .bridge(TunnelRequest {
            target,
            initial_bytes,
            client,
            peer,
        })
        .await
        .map(|_| ())
}

fn connect_target(head: &RequestHead) -> Result<(TunnelTarget, String)> {
    let target = TunnelTarget::parse(&head.line.target)?;
    let version = head.line.http_version()?.to_string();
    Ok((target, version))
}

pub fn connection_established(version: &str) -> String {
    format!("HTTP/{} 200 Connection Established\r\n\r\n", version)
}
