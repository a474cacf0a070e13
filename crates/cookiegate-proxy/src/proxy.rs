//! The local proxy server.
//!
//! Control endpoints live under `/__cookiegate/`. Every other path falls
//! through to [`handle_proxy`]: API paths are forwarded to the remote origin
//! through the [`Interceptor`], anything else goes to the fallback origin
//! untouched (or 404s when there is none).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router as AxumRouter,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::forward::forward;
use crate::interceptor::Interceptor;
use crate::path_matcher::PathMatcher;
use crate::refresher::{RefreshTrigger, TlsPolicy};
use crate::sso_script::SsoScript;
use crate::websocket::{is_websocket_upgrade, proxy_websocket};

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    /// Remote origin that API paths are forwarded to.
    pub target_origin: Url,
    /// Local dev server for every non-API path.
    pub fallback_origin: Option<Url>,
    pub paths: PathMatcher,
    pub tls: TlsPolicy,
    /// Proxy WebSocket upgrades on API paths.
    pub websocket: bool,
    pub enable_cors: bool,
    /// Served at `/__cookiegate/sso.js` when set.
    pub sso_script: Option<SsoScript>,
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr, target_origin: Url) -> Self {
        Self {
            bind_addr,
            target_origin,
            fallback_origin: None,
            paths: PathMatcher::default(),
            tls: TlsPolicy::Verify,
            websocket: false,
            enable_cors: false,
            sso_script: None,
        }
    }

    pub fn with_fallback_origin(mut self, origin: Url) -> Self {
        self.fallback_origin = Some(origin);
        self
    }

    pub fn with_paths(mut self, paths: PathMatcher) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_websocket(mut self, enabled: bool) -> Self {
        self.websocket = enabled;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }

    pub fn with_sso_script(mut self, script: SsoScript) -> Self {
        self.sso_script = Some(script);
        self
    }
}

/// Shared state for the proxy server.
struct ProxyState {
    config: ProxyConfig,
    interceptor: Arc<Interceptor>,
    client: reqwest::Client,
}

/// The cookie-injecting proxy server.
pub struct ProxyServer {
    state: Arc<ProxyState>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, interceptor: Arc<Interceptor>) -> Result<Self> {
        // Redirects go back to the browser untouched; a 302 to the SSO page
        // is also what the unauth detector looks for.
        let client = config
            .tls
            .client_builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build proxy client: {}", e)))?;

        Ok(Self {
            state: Arc::new(ProxyState {
                config,
                interceptor,
                client,
            }),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.state.config
    }

    /// Build the axum router.
    pub fn router(&self) -> AxumRouter {
        let mut router = AxumRouter::new()
            .route("/__cookiegate/health", get(handle_health))
            .route("/__cookiegate/status", get(handle_status))
            .route("/__cookiegate/refresh", post(handle_refresh))
            .route("/__cookiegate/sso.js", get(handle_sso_script))
            .fallback(handle_proxy)
            .with_state(self.state.clone());

        if self.state.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Run the proxy server until `shutdown` resolves, then drain connections.
    pub async fn run_until(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.log_start(listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Run with graceful shutdown, returning the bound address.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        self.log_start(local_addr);
        tokio::spawn(async move {
            axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown)
                .await
                .ok();
        });
        Ok(local_addr)
    }

    fn log_start(&self, addr: SocketAddr) {
        let config = &self.state.config;
        tracing::info!(
            addr = %addr,
            target = %config.target_origin,
            fallback = config.fallback_origin.as_ref().map(|u| u.to_string()),
            websocket = config.websocket,
            "Starting cookiegate proxy"
        );
    }
}

/// Handle GET /__cookiegate/health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cookiegate"
    }))
}

/// Handle GET /__cookiegate/status
async fn handle_status(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "refreshing": state.interceptor.gate().is_refreshing(),
        "cookies": state.interceptor.store().names(),
    }))
}

/// Handle POST /__cookiegate/refresh
async fn handle_refresh(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    let outcome = state
        .interceptor
        .gate()
        .ensure_fresh(RefreshTrigger::Manual)
        .await;
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(outcome))
}

/// Handle GET /__cookiegate/sso.js
async fn handle_sso_script(State(state): State<Arc<ProxyState>>) -> Response {
    match &state.config.sso_script {
        Some(script) => (
            [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
            script.render(),
        )
            .into_response(),
        None => not_found(),
    }
}

/// Everything that is not a control endpoint.
async fn handle_proxy(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let config = &state.config;

    if config.paths.matches(&path) {
        let interceptor = state.interceptor.as_ref();

        if config.websocket && is_websocket_upgrade(req.headers()) {
            return proxy_websocket(interceptor, &config.target_origin, config.tls, req).await;
        }

        return match forward(&state.client, &config.target_origin, req, Some(interceptor)).await {
            Ok(response) => response,
            Err(e) => {
                interceptor.on_error(&method, &path, &e);
                e.into_response()
            }
        };
    }

    let Some(fallback) = &config.fallback_origin else {
        return not_found();
    };

    match forward(&state.client, fallback, req, None).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(%method, path, error = %e, "Fallback forward failed");
            e.into_response()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found",
    )
        .into_response()
}
