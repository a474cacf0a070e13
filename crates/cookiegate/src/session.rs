//! Wiring from a resolved config to the proxy's runtime objects.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use cookiegate_config::{PathRuleConfig, ResolvedConfig, ResolvedLogin, UnauthConfig};
use cookiegate_proxy::{
    CookieStore, DefaultDetector, HeadlessLogin, Interceptor, LoginRequest, PathMatcher,
    PathRule, ProxyConfig, RefreshGate, SharedCookieStore, SsoScript, TlsPolicy,
};

/// Cookie store, refresh gate and interceptor for one proxy process.
pub struct Session {
    pub store: SharedCookieStore,
    pub gate: Arc<RefreshGate>,
    pub interceptor: Arc<Interceptor>,
}

impl Session {
    pub fn new(resolved: &ResolvedConfig) -> Result<Self> {
        let store = Arc::new(CookieStore::new());

        let login = resolved
            .headless_login
            .as_ref()
            .map(login_request)
            .transpose()?;
        let refresher = HeadlessLogin::new(
            login,
            store.clone(),
            TlsPolicy::from_insecure(resolved.insecure),
            resolved.refresh_timeout,
        )?;

        let gate = Arc::new(RefreshGate::new(Arc::new(refresher)));
        let interceptor = Interceptor::new(store.clone(), gate.clone())
            .with_detector(Arc::new(detector(&resolved.unauthenticated)));

        Ok(Self {
            store,
            gate,
            interceptor: Arc::new(interceptor),
        })
    }
}

fn login_request(login: &ResolvedLogin) -> Result<LoginRequest> {
    let mut request = LoginRequest::get(login.url.as_str()).with_method(&login.method)?;
    for (name, value) in &login.headers {
        request = request.with_header(name, value)?;
    }
    if let Some(body) = &login.body {
        request = request.with_body(body.clone());
    }
    Ok(request)
}

fn detector(config: &UnauthConfig) -> DefaultDetector {
    DefaultDetector {
        statuses: config.statuses.clone(),
        redirect_statuses: config.redirect_statuses.clone(),
        location_markers: config.location_markers.clone(),
    }
}

pub fn path_matcher(rules: &[PathRuleConfig]) -> Result<PathMatcher> {
    let rules = rules
        .iter()
        .map(|rule| match rule {
            PathRuleConfig::Prefix(prefix) => Ok(PathRule::prefix(prefix.clone())),
            PathRuleConfig::Pattern { pattern } => PathRule::pattern(pattern)
                .with_context(|| format!("invalid api_paths pattern '{}'", pattern)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PathMatcher::new(rules))
}

pub fn sso_script(resolved: &ResolvedConfig) -> SsoScript {
    let mut script = SsoScript::new(
        resolved.validation_url.as_str(),
        resolved.cookie_name.as_str(),
        resolved.sso_message.as_str(),
    );
    script.validation_query = resolved.validation_query.clone();
    script
}

pub fn proxy_config(resolved: &ResolvedConfig) -> Result<ProxyConfig> {
    let mut config = ProxyConfig::new(resolved.bind_addr, resolved.target_origin.clone())
        .with_paths(path_matcher(&resolved.api_paths)?)
        .with_tls(TlsPolicy::from_insecure(resolved.insecure))
        .with_websocket(resolved.websocket)
        .with_cors(resolved.cors)
        .with_sso_script(sso_script(resolved));
    if let Some(fallback) = &resolved.fallback_origin {
        config = config.with_fallback_origin(fallback.clone());
    }
    Ok(config)
}
