//! WebSocket upgrade over an already-open transport.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use wsbridge_core::{Headers, ResolvedEndpoint};

use crate::errors::ClientError;

/// Established WebSocket over plain TCP or TLS.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the upgrade request for `endpoint` carrying `headers`.
///
/// Each configured header replaces whatever the request already holds under
/// that name.
pub fn build_request(endpoint: &ResolvedEndpoint, headers: &Headers) -> Result<Request, ClientError> {
    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ClientError::permanent(format!("cannot build upgrade request: {e}")))?;

    let target = request.headers_mut();
    for (name, values) in headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::permanent(format!("invalid header name '{name}': {e}")))?;
        let _ = target.remove(&name);
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::permanent(format!("invalid value for header '{name}': {e}")))?;
            let _ = target.append(name.clone(), value);
        }
    }
    Ok(request)
}

/// Perform the upgrade exchange over `stream`, wrapping it in TLS for `wss`.
pub async fn upgrade(request: Request, stream: TcpStream, timeout: Duration) -> Result<WsStream, ClientError> {
    let exchange = tokio_tungstenite::client_async_tls_with_config(request, stream, None, None);
    match tokio::time::timeout(timeout, exchange).await {
        Err(_) => Err(ClientError::transient(format!("handshake timed out after {timeout:?}"))),
        Ok(Err(e)) => Err(classify(&e)),
        Ok(Ok((ws, response))) => {
            debug!(status = response.status().as_u16(), "handshake accepted");
            Ok(ws)
        }
    }
}

/// Client-error responses are permanent; everything else may be retried.
pub fn classify(err: &WsError) -> ClientError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            let message = format!("server rejected handshake with {status}");
            if status.is_client_error() {
                ClientError::permanent(message)
            } else {
                ClientError::transient(message)
            }
        }
        WsError::Url(e) => ClientError::permanent(format!("invalid handshake url: {e}")),
        other => ClientError::transient(format!("handshake failed: {other}")),
    }
}
