use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{
    ProxyError, Result, SessionEnd, SessionInfo, SessionState, SessionSummary, SessionTotals, TunnelRequest,
    TunnelTarget,
};
use crate::config::Config;
use crate::ports::{DownloadStream, RelayPort, RelayRequest, TrackingPort, UploadStream};

pub const HOST_HEADER: &str = "x-host";
pub const PORT_HEADER: &str = "x-port";
pub const UUID_HEADER: &str = "x-uuid";

const READ_CHUNK: usize = 16 * 1024;
/// Chunks that may wait for the relay before reads from the client pause.
const UPLOAD_QUEUE_DEPTH: usize = 4;

/// Turns accepted CONNECT connections into relay POST exchanges.
///
/// One session per call to [`TunnelBridge::bridge`]: the client's bytes become
/// the request body and the response body is written back to the client.
pub struct TunnelBridge {
    config: Arc<Config>,
    relay: Arc<dyn RelayPort>,
    tracker: Arc<dyn TrackingPort>,
}

impl TunnelBridge {
    pub fn new(config: Arc<Config>, relay: Arc<dyn RelayPort>, tracker: Arc<dyn TrackingPort>) -> Self {
        Self { config, relay, tracker }
    }

    pub fn relay_request(&self, target: &TunnelTarget, body: UploadStream) -> RelayRequest {
        RelayRequest {
            url: self.config.relay_address.clone(),
            headers: vec![
                (HOST_HEADER, target.host.clone()),
                (PORT_HEADER, target.port.to_string()),
                (UUID_HEADER, self.config.tunnel_id.clone()),
            ],
            body,
        }
    }

    /// Runs one tunnel session to completion.
    ///
    /// The client must already have received the `200 Connection Established`
    /// acknowledgment. On return the client connection has been shut down and
    /// dropped and the relay exchange is finished or aborted.
    pub async fn bridge<S>(&self, request: TunnelRequest<S>) -> Result<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let TunnelRequest {
            target,
            initial_bytes,
            client,
            peer,
        } = request;

        let info = SessionInfo::new(&target, peer);
        let id = info.id;
        self.tracker.track_session(info).await.ok();

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (body_tx, body_rx) = mpsc::channel(UPLOAD_QUEUE_DEPTH);
        let relay_request = self.relay_request(&target, body_rx.boxed());

        let mut bytes_up = 0u64;
        let mut bytes_down = 0u64;

        let outcome = {
            let upload = pump_upload(initial_bytes, &mut client_read, body_tx, &mut bytes_up);
            let exchange = async {
                let response = self.relay.open(relay_request).await?;
                self.tracker.update_state(id, SessionState::Streaming).await.ok();
                if !response.is_success() {
                    return Err(ProxyError::RelayRejected(response.status));
                }
                debug!(session = %id, status = response.status, "relay accepted tunnel");
                pump_download(response.body, &mut client_write, &mut bytes_down).await
            };
            tokio::pin!(upload);
            tokio::pin!(exchange);

            // Client EOF only ends the relay body, the session then lasts until the response ends.
            // A client error or the end of the response drops whatever is still in flight.
            // The exchange is polled first so the relay request is always issued.
            let mut client_eof = false;
            loop {
                tokio::select! {
                    biased;
                    res = &mut exchange => {
                        let end = if client_eof { SessionEnd::ClientClosed } else { SessionEnd::RelayClosed };
                        break res.map(|_| end);
                    }
                    res = &mut upload, if !client_eof => match res {
                        Ok(()) => {
                            log::debug!("client finished sending for session {}", id);
                            client_eof = true;
                        }
                        Err(e) => break Err(e),
                    },
                }
            }
        };

        if let Err(e) = client_write.shutdown().await {
            log::debug!("shutdown of client connection for session {} failed: {}", id, e);
        }
        drop(client_write);
        drop(client_read);

        let totals = SessionTotals { bytes_up, bytes_down };
        self.tracker.close_session(id, totals).await.ok();

        match outcome {
            Ok(end) => {
                info!(
                    session = %id,
                    target = %target,
                    bytes_up = totals.bytes_up,
                    bytes_down = totals.bytes_down,
                    "tunnel closed ({:?})",
                    end
                );
                Ok(SessionSummary { id, end, totals })
            }
            Err(e) => {
                warn!(
                    session = %id,
                    target = %target,
                    kind = e.kind(),
                    bytes_up = totals.bytes_up,
                    bytes_down = totals.bytes_down,
                    "tunnel failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

/// Client → relay. Completes on client EOF, dropping `body` so the relay request ends cleanly.
/// A read error fails the body instead.
async fn pump_upload<R>(
    initial_bytes: Bytes,
    reader: &mut R,
    mut body: mpsc::Sender<io::Result<Bytes>>,
    sent: &mut u64,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    if !initial_bytes.is_empty() {
        let len = initial_bytes.len() as u64;
        if body.send(Ok(initial_bytes)).await.is_err() {
            return relay_stopped_reading().await;
        }
        *sent += len;
    }

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => {
                if body.send(Ok(buf.split().freeze())).await.is_err() {
                    return relay_stopped_reading().await;
                }
                *sent += n as u64;
            }
            Err(e) => {
                // Fail the body instead of ending it so the relay sees an aborted request
                let _ = body.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                return Err(ProxyError::ClientAbort(e.to_string()));
            }
        }
    }
}

/// The relay dropped the request body; the response side decides how the session ends.
async fn relay_stopped_reading() -> Result<()> {
    log::debug!("relay stopped consuming the request body");
    std::future::pending().await
}

/// Relay → client. Completes when the response body ends.
async fn pump_download<W>(mut body: DownloadStream, writer: &mut W, received: &mut u64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ProxyError::ClientAbort(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ProxyError::ClientAbort(e.to_string()))?;
        *received += chunk.len() as u64;
    }
    Ok(())
}
