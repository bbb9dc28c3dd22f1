use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::info;
use url::{Host, Position, Url};

use super::head::{reply_and_close, BAD_GATEWAY, BAD_REQUEST};
use crate::domain::{ProxyError, RequestHead, Result};

/// Proxy headers that only concern the hop between the client and us.
const HOP_HEADERS: [&str; 2] = ["proxy-connection", "proxy-authorization"];

/// Forwards a plain (non-CONNECT) proxy request straight to its origin.
///
/// The request line is rewritten to origin-form, then both directions are
/// copied until either side closes.
pub async fn forward<S>(head: RequestHead, mut reader: BufReader<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let origin = match OriginRequest::from_head(&head) {
        Ok(origin) => origin,
        Err(e) => {
            reply_and_close(reader.get_mut(), BAD_REQUEST).await;
            return Err(e);
        }
    };

    info!("proxy for http request: {}", origin.url);

    let mut upstream = match TcpStream::connect((origin.host.as_str(), origin.port)).await {
        Ok(stream) => stream,
        Err(e) => {
            reply_and_close(reader.get_mut(), BAD_GATEWAY).await;
            return Err(ProxyError::Io(format!("failed to connect to {}:{}: {}", origin.host, origin.port, e)));
        }
    };

    upstream.write_all(origin.head.as_bytes()).await?;
    upstream.write_all(reader.buffer()).await?;

    let mut client = reader.into_inner();
    let (to_origin, from_origin) = tokio::io::copy_bidirectional(&mut client, &mut upstream)
        .await
        .map_err(|e| ProxyError::ClientAbort(format!("passthrough to {} failed: {}", origin.url, e)))?;

    log::debug!("{}: to={} from={}", origin.url, to_origin, from_origin);
    Ok(())
}

struct OriginRequest {
    url: Url,
    host: String,
    port: u16,
    /// Rewritten request head, terminated by an empty line.
    head: String,
}

impl OriginRequest {
    fn from_head(head: &RequestHead) -> Result<Self> {
        let version = head.line.http_version()?;
        let url = Url::parse(&head.line.target)
            .map_err(|e| ProxyError::MalformedRequest(format!("invalid request target {:?}: {}", head.line.target, e)))?;

        if url.scheme() != "http" {
            return Err(ProxyError::MalformedRequest(format!("unsupported scheme in {}", url)));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(ProxyError::MalformedRequest(format!("no host in {}", url))),
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let path = &url[Position::BeforePath..Position::AfterQuery];
        let mut rewritten = format!("{} {} HTTP/{}\r\n", head.line.method, path, version);

        let mut has_host = false;
        for (name, value) in &head.headers {
            if HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            has_host |= name.eq_ignore_ascii_case("host");
            rewritten.push_str(&format!("{}: {}\r\n", name, value));
        }
        if !has_host {
            rewritten.push_str(&format!("Host: {}\r\n", &url[Position::BeforeHost..Position::AfterPort]));
        }
        rewritten.push_str("\r\n");

        Ok(Self {
            url,
            host,
            port,
            head: rewritten,
        })
    }
}
