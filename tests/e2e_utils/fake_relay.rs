#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;

type Body = UnsyncBoxBody<Bytes, hyper::Error>;

#[derive(Clone, Copy, Debug)]
pub enum RelayMode {
    /// Stream the request body straight back as the response body.
    Echo,
    /// Answer with this status and a short body without reading the request.
    Reject(u16),
}

/// One request as seen by the relay. The body is recorded frame by frame as it arrives.
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    headers: hyper::HeaderMap,
    body: Mutex<Vec<u8>>,
    finished: AtomicBool,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    }

    pub fn body(&self) -> Vec<u8> {
        self.body.lock().unwrap().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Waits until the relay stopped streaming this exchange, clean or aborted.
    pub async fn wait_until_finished(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.is_finished() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.is_finished()
    }
}

/// Marks the exchange finished once hyper drops the echoed body.
struct FinishGuard(Arc<RecordedRequest>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finished.store(true, Ordering::SeqCst);
    }
}

pub struct FakeRelay {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Arc<RecordedRequest>>>>,
    _server_handle: JoinHandle<()>,
}

impl FakeRelay {
    pub async fn start(mode: RelayMode) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests: Arc<Mutex<Vec<Arc<RecordedRequest>>>> = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let server_handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                let io = TokioIo::new(stream);
                let recorded = recorded.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let recorded = recorded.clone();
                        async move { Ok::<_, hyper::Error>(Self::handle(req, mode, recorded)) }
                    });

                    if let Err(_err) = ServerBuilder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        // Aborted tunnels surface here, nothing to report
                    }
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            _server_handle: server_handle,
        })
    }

    fn handle(
        req: Request<Incoming>,
        mode: RelayMode,
        recorded: Arc<Mutex<Vec<Arc<RecordedRequest>>>>,
    ) -> Response<Body> {
        let request = Arc::new(RecordedRequest {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            headers: req.headers().clone(),
            body: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        });
        recorded.lock().unwrap().push(request.clone());

        match mode {
            RelayMode::Echo => {
                let guard = FinishGuard(request.clone());
                let body = req
                    .into_body()
                    .map_frame(move |frame| {
                        if let Some(data) = frame.data_ref() {
                            guard.0.body.lock().unwrap().extend_from_slice(data);
                        }
                        frame
                    })
                    .boxed_unsync();
                Response::new(body)
            }
            RelayMode::Reject(status) => {
                request.finished.store(true, Ordering::SeqCst);
                Response::builder()
                    .status(status)
                    .body(
                        Full::new(Bytes::from_static(b"relay says no"))
                            .map_err(|never| match never {})
                            .boxed_unsync(),
                    )
                    .unwrap()
            }
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/tunnel", self.addr)
    }

    pub fn requests(&self) -> Vec<Arc<RecordedRequest>> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn wait_for_requests(&self, count: usize) -> Vec<Arc<RecordedRequest>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let requests = self.requests();
            if requests.len() >= count || Instant::now() >= deadline {
                return requests;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}
