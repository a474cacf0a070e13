//! Headless login: one out-of-band request whose `Set-Cookie` headers seed
//! the cookie store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::Serialize;

use crate::cookie_store::SharedCookieStore;
use crate::error::{ProxyError, Result};

/// Default time budget for a single refresh attempt.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of one refresh attempt. Never an error: failures are values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Cookies from the validation endpoint were merged into the store.
    Refreshed { cookies: usize },
    /// Headless login is disabled; nothing was attempted.
    Skipped,
    /// The attempt failed; the store is unchanged.
    Failed { message: String },
}

impl RefreshOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        RefreshOutcome::Failed {
            message: message.into(),
        }
    }

    /// True for `Refreshed` and `Skipped`.
    pub fn is_success(&self) -> bool {
        !matches!(self, RefreshOutcome::Failed { .. })
    }
}

/// Why a refresh was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    Unauthenticated(StatusCode),
    Manual,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTrigger::Startup => write!(f, "startup"),
            RefreshTrigger::Unauthenticated(status) => {
                write!(f, "unauthenticated response ({})", status.as_u16())
            }
            RefreshTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// TLS certificate policy shared by the refresher and the proxy transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Verify certificates (default).
    #[default]
    Verify,
    /// Accept self-signed and otherwise invalid certificates.
    AcceptInvalidCerts,
}

impl TlsPolicy {
    pub fn from_insecure(insecure: bool) -> Self {
        if insecure {
            TlsPolicy::AcceptInvalidCerts
        } else {
            TlsPolicy::Verify
        }
    }

    pub fn is_insecure(self) -> bool {
        self == TlsPolicy::AcceptInvalidCerts
    }

    /// A reqwest client builder with this policy applied.
    pub fn client_builder(self) -> reqwest::ClientBuilder {
        Client::builder().danger_accept_invalid_certs(self.is_insecure())
    }
}

/// Something that can obtain fresh session cookies.
#[async_trait]
pub trait CredentialRefresher: Send + Sync + fmt::Debug {
    /// Run one attempt. Must not panic and must eventually return.
    async fn refresh(&self) -> RefreshOutcome;
}

/// Shared refresher for use across async contexts.
pub type SharedRefresher = Arc<dyn CredentialRefresher>;

/// Request sent to the validation endpoint.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl LoginRequest {
    /// A plain GET against `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: &str) -> Result<Self> {
        self.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| ProxyError::Config(format!("Invalid login method '{}': {}", method, e)))?;
        Ok(self)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProxyError::Config(format!("Invalid login header '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProxyError::Config(format!("Invalid value for '{}': {}", name, e)))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Performs the headless login against the validation endpoint.
#[derive(Debug)]
pub struct HeadlessLogin {
    client: Client,
    request: Option<LoginRequest>,
    store: SharedCookieStore,
    timeout: Duration,
}

impl HeadlessLogin {
    /// `request = None` disables headless login: every refresh is `Skipped`.
    pub fn new(
        request: Option<LoginRequest>,
        store: SharedCookieStore,
        tls: TlsPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let client = tls
            .client_builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build login client: {}", e)))?;

        Ok(Self {
            client,
            request,
            store,
            timeout,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.request.is_some()
    }

    async fn send(&self, login: &LoginRequest) -> Result<usize> {
        let mut req = self
            .client
            .request(login.method.clone(), &login.url)
            .headers(login.headers.clone());

        // Credentials go along, like a browser request with credentials enabled.
        let cookies = self.store.to_header_string();
        if !cookies.is_empty() {
            req = req.header(header::COOKIE, cookies);
        }
        if let Some(body) = &login.body {
            req = req.body(body.clone());
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Upstream(format!(
                "validation endpoint returned {}",
                status
            )));
        }

        Ok(self.store.merge_headers(response.headers()))
    }
}

#[async_trait]
impl CredentialRefresher for HeadlessLogin {
    async fn refresh(&self) -> RefreshOutcome {
        let Some(login) = &self.request else {
            tracing::debug!("Headless login disabled, skipping refresh");
            return RefreshOutcome::Skipped;
        };

        tracing::debug!(url = %login.url, method = %login.method, "Sending headless login request");

        match tokio::time::timeout(self.timeout, self.send(login)).await {
            Ok(Ok(cookies)) => RefreshOutcome::Refreshed { cookies },
            Ok(Err(e)) => RefreshOutcome::failed(e.to_string()),
            Err(_) => RefreshOutcome::failed(format!(
                "headless login timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}
