//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]                  # local listener, fallback dev server
//! [auth]                    # remote origin, validation endpoint, API paths
//! [auth.headless_login]     # out-of-band login request
//! [auth.unauthenticated]    # expired-session detection
//! [logging]                 # optional JSON file log
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default local port.
pub const DEFAULT_PORT: u16 = 8787;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default auth cookie name checked by the SSO script.
pub const DEFAULT_COOKIE_NAME: &str = "myToken";

/// Default message posted by the SSO page once the cookie is set.
pub const DEFAULT_SSO_MESSAGE: &str = "myToken-set";

/// Default time budget for one headless login, in seconds.
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiegateConfig {
    /// Local server configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Remote origin and session configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    /// Log file configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl CookiegateConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole: a project-level `[auth]` replaces the
    /// user-level one rather than being merged key by key.
    pub fn merge(&mut self, other: CookiegateConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.auth.is_some() {
            self.auth = other.auth;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// `[server]`, or its defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Mutable `[server]`, created with defaults if absent.
    pub fn server_mut(&mut self) -> &mut ServerConfig {
        self.server.get_or_insert_with(ServerConfig::default)
    }

    /// Mutable `[auth]`, created with defaults if absent.
    pub fn auth_mut(&mut self) -> &mut AuthConfig {
        self.auth.get_or_insert_with(AuthConfig::default)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Local listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Local dev server that receives every non-API path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_origin: Option<String>,
    /// Add a permissive CORS layer.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            fallback_origin: None,
            cors: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Remote origin and session configuration.
///
/// ```toml
/// [auth]
/// validation_url = "https://dev.example.com/auth/validate"
/// api_paths = ["/api", { pattern = "^/graphql" }]
/// insecure = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Endpoint that sets the session cookies. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_url: Option<String>,
    /// Extra query the SSO script appends to the validation URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_query: Option<String>,
    /// Remote API origin. Defaults to the origin of `validation_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_origin: Option<String>,
    /// Paths forwarded to the remote origin.
    pub api_paths: Vec<PathRuleConfig>,
    /// Accept self-signed certificates.
    pub insecure: bool,
    /// Proxy WebSocket upgrades on API paths.
    pub websocket: bool,
    /// Cookie the SSO script checks for.
    pub cookie_name: String,
    /// Message the SSO page posts once the cookie is set.
    pub sso_message: String,
    /// Time budget for one headless login.
    pub refresh_timeout_secs: u64,
    /// Out-of-band login request.
    pub headless_login: HeadlessLoginSetting,
    /// Expired-session detection.
    pub unauthenticated: UnauthConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            validation_url: None,
            validation_query: None,
            target_origin: None,
            api_paths: vec![PathRuleConfig::Prefix("/api".to_string())],
            insecure: false,
            websocket: false,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            sso_message: DEFAULT_SSO_MESSAGE.to_string(),
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            headless_login: HeadlessLoginSetting::default(),
            unauthenticated: UnauthConfig::default(),
        }
    }
}

/// One API path rule: a bare string is a prefix, `{ pattern = "..." }` a regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathRuleConfig {
    Prefix(String),
    Pattern { pattern: String },
}

impl std::fmt::Display for PathRuleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathRuleConfig::Prefix(prefix) => write!(f, "{}", prefix),
            PathRuleConfig::Pattern { pattern } => write!(f, "/{}/", pattern),
        }
    }
}

/// `headless_login = true | false`, or a `[auth.headless_login]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeadlessLoginSetting {
    Enabled(bool),
    Request(HeadlessLoginRequest),
}

impl Default for HeadlessLoginSetting {
    fn default() -> Self {
        HeadlessLoginSetting::Enabled(false)
    }
}

impl HeadlessLoginSetting {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, HeadlessLoginSetting::Enabled(false))
    }
}

/// Explicit headless login request.
///
/// ```toml
/// [auth.headless_login]
/// method = "POST"
/// headers = { "x-dev-user" = "alice" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessLoginRequest {
    /// Defaults to the validation URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Defaults to GET.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Which upstream responses mean the session has expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnauthConfig {
    /// Statuses that always count as unauthenticated.
    pub statuses: Vec<u16>,
    /// Redirect statuses that count when `Location` contains a marker.
    pub redirect_statuses: Vec<u16>,
    /// Case-insensitive `Location` substrings.
    pub location_markers: Vec<String>,
}

impl Default for UnauthConfig {
    fn default() -> Self {
        Self {
            statuses: vec![401],
            redirect_statuses: vec![302],
            location_markers: vec!["/login/".to_string(), "/sso/".to_string()],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a JSON log file to the default log directory.
    pub file: bool,
    /// Write a JSON log file to this directory (implies `file`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Whether a file log should be written at all.
    pub fn file_enabled(&self) -> bool {
        self.file || self.dir.is_some()
    }

    /// Directory the file log goes to, if enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        match (&self.dir, self.file) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => crate::default_log_dir(),
            (None, false) => None,
        }
    }
}
