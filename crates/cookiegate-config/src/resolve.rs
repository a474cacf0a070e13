//! Validation and defaulting of a merged config.
//!
//! Everything the proxy needs is checked here, before any socket is bound.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::{
    ConfigError, CookiegateConfig, HeadlessLoginSetting, PathRuleConfig, Result, UnauthConfig,
};

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub bind_addr: SocketAddr,
    pub fallback_origin: Option<Url>,
    pub cors: bool,
    pub validation_url: Url,
    pub validation_query: Option<String>,
    pub target_origin: Url,
    pub api_paths: Vec<PathRuleConfig>,
    pub insecure: bool,
    pub websocket: bool,
    pub cookie_name: String,
    pub sso_message: String,
    pub refresh_timeout: Duration,
    /// `None` when headless login is disabled.
    pub headless_login: Option<ResolvedLogin>,
    pub unauthenticated: UnauthConfig,
    /// Directory for the JSON file log, if enabled.
    pub log_dir: Option<PathBuf>,
}

/// Headless login request with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLogin {
    pub url: Url,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl CookiegateConfig {
    /// Validate and fill defaults.
    ///
    /// Fails with [`ConfigError::MissingField`] when `auth.validation_url`
    /// is absent and [`ConfigError::InvalidUrl`] for unusable URLs.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let server = self.server();
        let auth = self.auth.clone().unwrap_or_default();

        let validation_url = auth
            .validation_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "validation_url".to_string(),
                context: "[auth]".to_string(),
            })
            .and_then(|raw| parse_url("auth.validation_url", raw))?;

        let target_origin = match auth.target_origin.as_deref() {
            Some(raw) => parse_url("auth.target_origin", raw)?,
            None => origin_of(&validation_url)?,
        };

        let fallback_origin = server
            .fallback_origin
            .as_deref()
            .map(|raw| parse_url("server.fallback_origin", raw))
            .transpose()?;

        let ip: IpAddr = server.bind.parse().map_err(|e| {
            ConfigError::Other(format!("invalid server.bind '{}': {}", server.bind, e))
        })?;

        if auth.api_paths.is_empty() {
            return Err(ConfigError::Other(
                "auth.api_paths is empty; nothing would be proxied".to_string(),
            ));
        }

        if auth.refresh_timeout_secs == 0 {
            return Err(ConfigError::Other(
                "auth.refresh_timeout_secs must be at least 1; 0 would fail every login"
                    .to_string(),
            ));
        }

        let headless_login = match &auth.headless_login {
            HeadlessLoginSetting::Enabled(false) => None,
            HeadlessLoginSetting::Enabled(true) => Some(ResolvedLogin {
                url: validation_url.clone(),
                method: "GET".to_string(),
                headers: BTreeMap::new(),
                body: None,
            }),
            HeadlessLoginSetting::Request(req) => Some(ResolvedLogin {
                url: match req.url.as_deref() {
                    Some(raw) => parse_url("auth.headless_login.url", raw)?,
                    None => validation_url.clone(),
                },
                method: req.method.clone().unwrap_or_else(|| "GET".to_string()),
                headers: req.headers.clone(),
                body: req.body.clone(),
            }),
        };

        let log_dir = self.logging.as_ref().and_then(|l| l.log_dir());

        Ok(ResolvedConfig {
            bind_addr: SocketAddr::new(ip, server.port),
            fallback_origin,
            cors: server.cors,
            validation_url,
            validation_query: auth.validation_query,
            target_origin,
            api_paths: auth.api_paths,
            insecure: auth.insecure,
            websocket: auth.websocket,
            cookie_name: auth.cookie_name,
            sso_message: auth.sso_message,
            refresh_timeout: Duration::from_secs(auth.refresh_timeout_secs),
            headless_login,
            unauthenticated: auth.unauthenticated,
            log_dir,
        })
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field: field.to_string(),
        value: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

/// `scheme://host[:port]` of `url`.
fn origin_of(url: &Url) -> Result<Url> {
    let origin = url.origin().ascii_serialization();
    Url::parse(&origin).map_err(|e| ConfigError::InvalidUrl {
        field: "auth.target_origin".to_string(),
        value: origin,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeadlessLoginRequest;

    fn config(toml: &str) -> CookiegateConfig {
        CookiegateConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn test_missing_validation_url_is_fatal() {
        let err = CookiegateConfig::new().resolve().unwrap_err();
        match err {
            ConfigError::MissingField { field, context } => {
                assert_eq!(field, "validation_url");
                assert_eq!(context, "[auth]");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let resolved = config(
            r#"
[auth]
validation_url = "https://dev.example.com:8443/auth/validate?x=1"
"#,
        )
        .resolve()
        .unwrap();

        assert_eq!(resolved.bind_addr, "127.0.0.1:8787".parse().unwrap());
        assert_eq!(resolved.target_origin.as_str(), "https://dev.example.com:8443/");
        assert_eq!(
            resolved.api_paths,
            vec![PathRuleConfig::Prefix("/api".to_string())]
        );
        assert!(resolved.fallback_origin.is_none());
        assert!(resolved.headless_login.is_none());
        assert_eq!(resolved.refresh_timeout, Duration::from_secs(15));
        assert_eq!(resolved.cookie_name, "myToken");
        assert_eq!(resolved.sso_message, "myToken-set");
        assert!(resolved.log_dir.is_none());
    }

    #[test]
    fn test_explicit_target_origin_wins() {
        let resolved = config(
            r#"
[auth]
validation_url = "https://sso.example.com/validate"
target_origin = "https://api.example.com"
"#,
        )
        .resolve()
        .unwrap();
        assert_eq!(resolved.target_origin.host_str(), Some("api.example.com"));
    }

    #[test]
    fn test_invalid_urls() {
        let err = config(
            r#"
[auth]
validation_url = "not a url"
"#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { ref field, .. } if field == "auth.validation_url"));

        let err = config(
            r#"
[server]
fallback_origin = "ftp://localhost"

[auth]
validation_url = "https://dev.example.com/v"
"#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { ref field, .. } if field == "server.fallback_origin"));
    }

    #[test]
    fn test_invalid_bind() {
        let err = config(
            r#"
[server]
bind = "localhost:80"

[auth]
validation_url = "https://dev.example.com/v"
"#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Other(_)));
    }

    #[test]
    fn test_headless_login_true_uses_validation_url() {
        let resolved = config(
            r#"
[auth]
validation_url = "https://dev.example.com/v"
headless_login = true
"#,
        )
        .resolve()
        .unwrap();
        let login = resolved.headless_login.unwrap();
        assert_eq!(login.url.as_str(), "https://dev.example.com/v");
        assert_eq!(login.method, "GET");
        assert!(login.body.is_none());
    }

    #[test]
    fn test_headless_login_table() {
        let mut cfg = config(
            r#"
[auth]
validation_url = "https://dev.example.com/v"
"#,
        );
        cfg.auth_mut().headless_login = HeadlessLoginSetting::Request(HeadlessLoginRequest {
            url: Some("https://dev.example.com/login".to_string()),
            method: Some("POST".to_string()),
            headers: BTreeMap::from([("x-dev-user".to_string(), "alice".to_string())]),
            body: Some("{}".to_string()),
        });

        let login = cfg.resolve().unwrap().headless_login.unwrap();
        assert_eq!(login.url.path(), "/login");
        assert_eq!(login.method, "POST");
        assert_eq!(login.headers["x-dev-user"], "alice");
    }

    #[test]
    fn test_empty_api_paths_rejected() {
        let err = config(
            r#"
[auth]
validation_url = "https://dev.example.com/v"
api_paths = []
"#,
        )
        .resolve()
        .unwrap_err();
        assert!(err.to_string().contains("api_paths"));
    }

    #[test]
    fn test_zero_refresh_timeout_rejected() {
        let err = config(
            r#"
[auth]
validation_url = "https://dev.example.com/v"
refresh_timeout_secs = 0
"#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Other(_)));
        assert!(err.to_string().contains("refresh_timeout_secs"));

        let resolved = config(
            r#"
[auth]
validation_url = "https://dev.example.com/v"
refresh_timeout_secs = 1
"#,
        )
        .resolve()
        .unwrap();
        assert_eq!(resolved.refresh_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_log_dir() {
        let resolved = config(
            r#"
[auth]
validation_url = "https://dev.example.com/v"

[logging]
dir = "/tmp/cg-logs"
"#,
        )
        .resolve()
        .unwrap();
        assert_eq!(resolved.log_dir, Some(PathBuf::from("/tmp/cg-logs")));
    }
}
