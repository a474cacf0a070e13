//! WebSocket proxying for API paths.
//!
//! The upgrade request goes through the interceptor like any HTTP request,
//! then the upstream handshake is completed before the client is upgraded.
//! Once both sides are open, frames are pumped in both directions; an error
//! on either side tears down the whole channel.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::forward::{forwardable_headers, upstream_url};
use crate::interceptor::Interceptor;
use crate::refresher::TlsPolicy;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Whether the request asks for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// `http(s)://origin` + request path → `ws(s)://origin/path`.
pub(crate) fn upstream_ws_url(origin: &Url, uri: &Uri) -> Result<Url> {
    let mut url = upstream_url(origin, uri);
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| ProxyError::Config(format!("Cannot derive WebSocket URL from {}", origin)))?;
    Ok(url)
}

fn connector(tls: TlsPolicy) -> Result<Option<Connector>> {
    if !tls.is_insecure() {
        return Ok(None);
    }
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| ProxyError::Config(format!("Failed to build TLS connector: {}", e)))?;
    Ok(Some(Connector::NativeTls(connector)))
}

/// Client headers to replay on the upstream handshake.
///
/// The key, version and extension negotiation belong to each hop, so those
/// are generated fresh by the upstream client.
pub(crate) fn handshake_headers(client_headers: &HeaderMap) -> HeaderMap {
    let mut headers = forwardable_headers(client_headers);
    for name in [
        header::SEC_WEBSOCKET_KEY,
        header::SEC_WEBSOCKET_VERSION,
        header::SEC_WEBSOCKET_EXTENSIONS,
        header::SEC_WEBSOCKET_ACCEPT,
    ] {
        headers.remove(name);
    }
    headers
}

/// Proxy one WebSocket upgrade request.
pub(crate) async fn proxy_websocket(
    interceptor: &Interceptor,
    origin: &Url,
    tls: TlsPolicy,
    req: Request,
) -> Response {
    let (mut parts, _body) = req.into_parts();
    let path = parts.uri.path().to_string();

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    match connect_upstream(interceptor, origin, tls, &parts.uri, &parts.headers).await {
        Ok((upstream, protocol)) => {
            let upgrade = match protocol {
                Some(protocol) => upgrade.protocols([protocol]),
                None => upgrade,
            };
            upgrade.on_upgrade(move |socket| pump(socket, upstream, path))
        }
        Err(e) => {
            interceptor.on_error(&parts.method, &path, &e);
            e.into_response()
        }
    }
}

/// Open the upstream socket with the session cookies attached.
async fn connect_upstream(
    interceptor: &Interceptor,
    origin: &Url,
    tls: TlsPolicy,
    uri: &Uri,
    client_headers: &HeaderMap,
) -> Result<(UpstreamSocket, Option<String>)> {
    let mut headers = handshake_headers(client_headers);
    interceptor.on_request(&mut headers).await;

    let url = upstream_ws_url(origin, uri)?;
    let mut request = url.as_str().into_client_request()?;
    for name in headers.keys() {
        request.headers_mut().remove(name);
        for value in headers.get_all(name) {
            request.headers_mut().append(name.clone(), value.clone());
        }
    }

    match tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector(tls)?)
        .await
    {
        Ok((socket, response)) => {
            interceptor.on_response(uri.path(), response.status(), response.headers());
            let protocol = response
                .headers()
                .get(header::SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok((socket, protocol))
        }
        Err(tungstenite::Error::Http(response)) => {
            // Handshake refused; the refusal itself may be an expired session.
            interceptor.on_response(uri.path(), response.status(), response.headers());
            Err(ProxyError::Upstream(format!(
                "WebSocket handshake rejected with {}",
                response.status()
            )))
        }
        Err(e) => Err(e.into()),
    }
}

/// Relay frames until either side closes or fails.
async fn pump(client: WebSocket, upstream: UpstreamSocket, path: String) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(msg) = client_rx.next().await {
            let msg = msg.map_err(|e| ProxyError::WebSocket(e.to_string()))?;
            let closing = matches!(msg, Message::Close(_));
            upstream_tx.send(to_upstream(msg)).await?;
            if closing {
                break;
            }
        }
        Ok::<_, ProxyError>(())
    };

    let upstream_to_client = async {
        while let Some(msg) = upstream_rx.next().await {
            let Some(msg) = from_upstream(msg?) else {
                continue;
            };
            let closing = matches!(msg, Message::Close(_));
            client_tx
                .send(msg)
                .await
                .map_err(|e| ProxyError::WebSocket(e.to_string()))?;
            if closing {
                break;
            }
        }
        Ok::<_, ProxyError>(())
    };

    let result = tokio::select! {
        r = client_to_upstream => r,
        r = upstream_to_client => r,
    };

    match result {
        Ok(()) => tracing::debug!(path = %path, "WebSocket channel closed"),
        Err(e) => tracing::warn!(path = %path, error = %e, "WebSocket channel aborted"),
    }
}

fn to_upstream(msg: Message) -> UpstreamMessage {
    match msg {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

fn from_upstream(msg: UpstreamMessage) -> Option<Message> {
    match msg {
        UpstreamMessage::Text(text) => Some(Message::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => Some(Message::Binary(data)),
        UpstreamMessage::Ping(data) => Some(Message::Ping(data)),
        UpstreamMessage::Pong(data) => Some(Message::Pong(data)),
        UpstreamMessage::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().into(),
        }))),
        UpstreamMessage::Frame(_) => None,
    }
}
