use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::{ProxyError, RequestHead, RequestLine, Result};

/// Upper bound for the request line plus all header lines.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

/// Reads a request head, leaving any bytes that follow it buffered in `reader`.
pub async fn read_request_head<R>(reader: &mut R) -> Result<RequestHead>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_HEAD_BYTES;

    let first = read_head_line(reader, &mut budget).await?;
    if first.is_empty() {
        return Err(ProxyError::MalformedRequest("connection closed before request line".into()));
    }
    let line = RequestLine::parse(&first)?;

    let mut headers = Vec::new();
    loop {
        let raw = read_head_line(reader, &mut budget).await?;
        if raw.is_empty() {
            return Err(ProxyError::MalformedRequest("connection closed inside request head".into()));
        }

        let raw = raw.trim_end_matches(['\r', '\n']);
        if raw.is_empty() {
            break;
        }

        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| ProxyError::MalformedRequest(format!("bad header line {:?}", raw)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(RequestHead { line, headers })
}

/// Returns one line including its terminator, or an empty string at EOF.
async fn read_head_line<R>(reader: &mut R, budget: &mut usize) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(*budget as u64)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| ProxyError::ClientAbort(e.to_string()))?;

    if n > 0 && !buf.ends_with(b"\n") {
        return Err(if n == *budget {
            ProxyError::MalformedRequest(format!("request head exceeds {} bytes", MAX_HEAD_BYTES))
        } else {
            ProxyError::MalformedRequest("connection closed inside request head".into())
        });
    }
    *budget -= n;

    String::from_utf8(buf).map_err(|_| ProxyError::MalformedRequest("request head is not valid UTF-8".into()))
}

/// Best-effort error reply; the connection is being torn down either way.
pub async fn reply_and_close<W>(writer: &mut W, response: &[u8])
where
    W: AsyncWrite + Unpin,
{
    if writer.write_all(response).await.is_ok() {
        writer.shutdown().await.ok();
    }
}
