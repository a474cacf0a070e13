//! Authenticating development proxy.
//!
//! Forwards a local front-end's API calls to a remote origin with session
//! cookies attached, and keeps those cookies fresh by re-running a headless
//! login whenever the backend reports an expired session.
//!
//! # Components
//!
//! - [`cookie_store`]: process-wide name → value cookie jar
//! - [`refresher`]: headless login against the validation endpoint
//! - [`refresh_gate`]: singleflight wrapper: at most one refresh in flight
//! - [`unauth`]: expired-session detection on upstream responses
//! - [`path_matcher`]: which paths belong to the proxied API surface
//! - [`interceptor`]: per-request glue tying the above together
//! - [`proxy`]: axum server: HTTP forwarding, WebSocket relay, control endpoints
//! - [`sso_script`]: browser-side silent SSO script

pub mod cookie_store;
pub mod error;
mod forward;
pub mod interceptor;
pub mod path_matcher;
pub mod proxy;
pub mod refresh_gate;
pub mod refresher;
pub mod sso_script;
pub mod unauth;
mod websocket;

pub use cookie_store::{CookieStore, SharedCookieStore};
pub use error::{ProxyError, Result};
pub use interceptor::Interceptor;
pub use path_matcher::{PathMatcher, PathRule};
pub use proxy::{ProxyConfig, ProxyServer};
pub use refresh_gate::{RefreshGate, RefreshHandle};
pub use refresher::{
    CredentialRefresher, DEFAULT_REFRESH_TIMEOUT, HeadlessLogin, LoginRequest, RefreshOutcome,
    RefreshTrigger, SharedRefresher, TlsPolicy,
};
pub use sso_script::SsoScript;
pub use unauth::{DefaultDetector, SharedUnauthDetector, UnauthDetector};
pub use websocket::is_websocket_upgrade;
