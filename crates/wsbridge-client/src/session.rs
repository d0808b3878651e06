//! Read/write/keepalive loop for one established connection.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::WsClient;
use crate::errors::ClientError;
use crate::handshake::WsStream;
use crate::registry::InboundMessage;
use crate::watchdog::{Watchdog, WatchdogAction};

/// A frame queued by `send_message` / `send_binary`.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Binary(Bytes),
}

impl Outbound {
    fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::text(text),
            Self::Binary(data) => Message::binary(data),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drive the connection until it is cancelled or fails.
///
/// Failures are reported through [`WsClient::fail`] under `generation`;
/// cancellation is not a failure.
pub(crate) async fn run(
    client: WsClient,
    generation: u64,
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
    mut watchdog: Option<Watchdog>,
) {
    let pong_timeout = client.config().pong_timeout;
    let (mut sink, mut stream) = ws.split();

    let failure = loop {
        let deadline = watchdog.as_ref().map(Watchdog::next_deadline);

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break None;
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                };
                if let Err(e) = sink.send(frame.into_message()).await {
                    break Some(ClientError::transient(format!("write failed: {e}")));
                }
            }

            inbound = stream.next() => {
                let now = Instant::now();
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(wd) = watchdog.as_mut() {
                            wd.record_inbound(now);
                        }
                        client.dispatch(&InboundMessage::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Some(wd) = watchdog.as_mut() {
                            wd.record_inbound(now);
                        }
                        client.dispatch(&InboundMessage::Binary(data));
                    }
                    // The transport answers pings itself.
                    Some(Ok(Message::Ping(_))) => {
                        trace!(endpoint = %client.uri(), "ping received");
                        if let Some(wd) = watchdog.as_mut() {
                            wd.record_inbound(now);
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        trace!(endpoint = %client.uri(), "pong received");
                        if let Some(wd) = watchdog.as_mut() {
                            wd.record_pong(now);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(
                            || "server closed the connection".to_owned(),
                            |f| format!("server closed the connection: {} {}", u16::from(f.code), f.reason),
                        );
                        break Some(ClientError::transient(reason));
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        break Some(ClientError::transient(format!("read failed: {e}")));
                    }
                    None => {
                        break Some(ClientError::transient("connection closed"));
                    }
                }
            }

            () = sleep_until(deadline) => {
                let Some(wd) = watchdog.as_mut() else { continue };
                match wd.poll(Instant::now()) {
                    Some(WatchdogAction::SendPing) => {
                        debug!(endpoint = %client.uri(), "idle timeout elapsed, sending ping");
                        if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                            break Some(ClientError::transient(format!("ping failed: {e}")));
                        }
                    }
                    Some(WatchdogAction::TimedOut) => {
                        warn!(endpoint = %client.uri(), timeout = ?pong_timeout, "pong not received");
                        break Some(ClientError::KeepaliveTimeout(pong_timeout));
                    }
                    None => {}
                }
            }
        }
    };

    if let Some(err) = failure {
        client.fail(generation, err);
    } else {
        debug!(endpoint = %client.uri(), "session closed");
    }
}
