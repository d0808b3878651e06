//! In-process WebSocket server for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use wsbridge_client::{ClientConfig, WsClient};
use wsbridge_core::EndpointDescriptor;
use wsbridge_http::{HttpClientConfig, ReqwestHttpClient};

/// How the server treats accepted connections.
#[derive(Clone, Copy, Debug)]
pub enum Mode {
    /// Read frames (answering pings) and push broadcast messages.
    Normal,
    /// Complete the handshake, then never read or write again.
    Silent,
    /// Reject the upgrade with this status.
    Reject(u16),
}

#[derive(Default)]
struct Recorded {
    authorization: Vec<Vec<String>>,
    received: Vec<String>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Recorded>>,
    push: broadcast::Sender<String>,
}

impl TestServer {
    pub async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let (push, _) = broadcast::channel(16);

        let server = Self {
            addr,
            accepted: Arc::clone(&accepted),
            recorded: Arc::clone(&recorded),
            push: push.clone(),
        };

        let _ = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                let _ = accepted.fetch_add(1, Ordering::SeqCst);
                let Some(ws) = handshake(stream, mode, &recorded).await else {
                    continue;
                };
                match mode {
                    Mode::Silent => held.push(ws),
                    Mode::Normal => {
                        let _ = tokio::spawn(serve(ws, Arc::clone(&recorded), push.subscribe()));
                    }
                    Mode::Reject(_) => {}
                }
            }
        });

        server
    }

    pub fn uri(&self) -> String {
        format!("ws://{}/socket", self.addr)
    }

    /// TCP connections accepted so far, including rejected upgrades.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// `Authorization` values seen on each upgrade request.
    pub fn authorization(&self) -> Vec<Vec<String>> {
        self.recorded.lock().authorization.clone()
    }

    /// Text frames received from clients, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.recorded.lock().received.clone()
    }

    /// Send a text frame to every connected client.
    pub fn push(&self, text: &str) {
        let _ = self.push.send(text.to_owned());
    }
}

async fn handshake(
    stream: TcpStream,
    mode: Mode,
    recorded: &Arc<Mutex<Recorded>>,
) -> Option<WebSocketStream<TcpStream>> {
    let recorded = Arc::clone(recorded);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let values = req
            .headers()
            .get_all("authorization")
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_owned))
            .collect();
        recorded.lock().authorization.push(values);
        if let Mode::Reject(status) = mode {
            let mut rejection = ErrorResponse::new(Some("rejected".to_owned()));
            *rejection.status_mut() = StatusCode::from_u16(status).unwrap();
            return Err(rejection);
        }
        Ok(resp)
    };
    tokio_tungstenite::accept_hdr_async(stream, callback).await.ok()
}

async fn serve(
    ws: WebSocketStream<TcpStream>,
    recorded: Arc<Mutex<Recorded>>,
    mut push: broadcast::Receiver<String>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => recorded.lock().received.push(text.as_str().to_owned()),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            Ok(text) = push.recv() => {
                if sink.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Timings short enough for real-time tests.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        idle_timeout: Duration::from_millis(200),
        pong_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(2),
        settle_delay: Duration::from_millis(100),
        late_registration_delay: Duration::from_millis(50),
    }
}

pub fn client(endpoint: EndpointDescriptor, config: ClientConfig) -> WsClient {
    let http = ReqwestHttpClient::new(&HttpClientConfig::default()).unwrap();
    WsClient::new(endpoint, config, Arc::new(http))
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
