#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;

/// Plain HTTP server that answers every request with its own path and Host header.
pub struct OriginServer {
    addr: SocketAddr,
    _server_handle: JoinHandle<()>,
}

impl OriginServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server_handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let io = TokioIo::new(stream);
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let host = req
                            .headers()
                            .get("host")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let text = format!("origin saw {} for {}", req.uri(), host);
                        Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(text))))
                    });

                    let _ = ServerBuilder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        Ok(Self {
            addr,
            _server_handle: server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
