//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use url::Url;
use wiremock::MockServer;

use cookiegate_proxy::{
    CookieStore, HeadlessLogin, Interceptor, LoginRequest, ProxyConfig, ProxyServer,
    RefreshGate, RefreshOutcome, RefreshTrigger, SharedCookieStore, TlsPolicy,
};

/// Path of the validation endpoint on the mock origin.
pub const VALIDATE_PATH: &str = "/auth/validate";

/// A proxy running in the background against a mock remote origin.
pub struct TestProxy {
    pub addr: SocketAddr,
    /// Browser-side client; never follows redirects.
    pub client: Client,
    pub store: SharedCookieStore,
    pub gate: Arc<RefreshGate>,
    /// Outcome of the startup refresh.
    pub startup: RefreshOutcome,
    _shutdown: oneshot::Sender<()>,
}

impl TestProxy {
    /// Proxy to `origin`, with headless login against its validation path.
    pub async fn start(origin: &MockServer) -> Result<Self> {
        Self::start_with(origin, |config| config).await
    }

    pub async fn start_with(
        origin: &MockServer,
        configure: impl FnOnce(ProxyConfig) -> ProxyConfig,
    ) -> Result<Self> {
        let target = Url::parse(&origin.uri())?;
        let login = LoginRequest::get(format!("{}{}", origin.uri(), VALIDATE_PATH));
        Self::start_raw(target, Some(login), configure).await
    }

    /// Proxy to an arbitrary target, optionally with headless login.
    pub async fn start_raw(
        target: Url,
        login: Option<LoginRequest>,
        configure: impl FnOnce(ProxyConfig) -> ProxyConfig,
    ) -> Result<Self> {
        let store = Arc::new(CookieStore::new());
        let refresher = HeadlessLogin::new(
            login,
            store.clone(),
            TlsPolicy::Verify,
            Duration::from_secs(5),
        )?;
        let gate = Arc::new(RefreshGate::new(Arc::new(refresher)));
        let interceptor = Arc::new(Interceptor::new(store.clone(), gate.clone()));

        let startup = gate.ensure_fresh(RefreshTrigger::Startup).await;

        let config = configure(ProxyConfig::new("127.0.0.1:0".parse()?, target));
        let server = ProxyServer::new(config, interceptor)?;

        let (tx, rx) = oneshot::channel::<()>();
        let addr = server
            .run_with_shutdown(async move {
                rx.await.ok();
            })
            .await?;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            addr,
            client,
            store,
            gate,
            startup,
            _shutdown: tx,
        })
    }

    /// Full URL for a path on the proxy.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait until no refresh is in flight.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.gate.wait())
            .await
            .expect("refresh did not settle");
    }
}

/// An origin URL nothing is listening on.
pub async fn closed_origin() -> Result<Url> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(Url::parse(&format!("http://{}", addr))?)
}

/// How a [`WsOrigin`] behaves after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsBehaviour {
    /// Echo every data frame back until the client closes.
    Echo,
    /// Echo the first data frame, then drop the connection without a close frame.
    EchoOnceThenDrop,
}

/// A single-connection WebSocket origin that records its handshake headers.
pub struct WsOrigin {
    pub url: Url,
    handshake: oneshot::Receiver<HeaderMap>,
}

impl WsOrigin {
    pub async fn start(behaviour: WsBehaviour) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("http://{}", listener.local_addr()?))?;
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let record = move |req: &Request,
                               resp: Response|
                  -> std::result::Result<Response, ErrorResponse> {
                tx.send(req.headers().clone()).ok();
                Ok(resp)
            };
            let Ok(mut socket) = tokio_tungstenite::accept_hdr_async(stream, record).await else {
                return;
            };
            while let Some(Ok(msg)) = socket.next().await {
                if msg.is_close() {
                    break;
                }
                if !(msg.is_text() || msg.is_binary()) {
                    continue;
                }
                if socket.send(msg).await.is_err() {
                    break;
                }
                if behaviour == WsBehaviour::EchoOnceThenDrop {
                    // Dropping the stream closes the TCP connection abruptly.
                    break;
                }
            }
        });

        Ok(Self { url, handshake: rx })
    }

    /// Headers of the handshake the origin accepted.
    pub async fn handshake_headers(self) -> HeaderMap {
        tokio::time::timeout(Duration::from_secs(5), self.handshake)
            .await
            .expect("no handshake reached the origin")
            .expect("origin task ended before the handshake")
    }
}
