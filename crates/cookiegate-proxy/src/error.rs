//! Error types for the proxy.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur while proxying.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Network/HTTP error talking to the remote origin.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote origin answered, but not in a usable way.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Invalid inbound request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// WebSocket channel error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Path rule pattern failed to compile.
    #[error("Invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProxyError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ProxyError::WebSocket(e.to_string())
    }
}

impl ProxyError {
    /// HTTP status used when this error is surfaced to the requesting client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Network(_) | ProxyError::Upstream(_) | ProxyError::WebSocket(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Config(_) | ProxyError::Pattern(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Plain-text error body; the client only ever sees a generic failure.
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Proxy error: {}", self),
        )
            .into_response()
    }
}
