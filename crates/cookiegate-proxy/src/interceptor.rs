//! Per-request glue between the transport and the auth session.
//!
//! Outbound: wait for any running refresh, then attach the stored cookies.
//! Inbound: absorb `Set-Cookie`, and kick off a background refresh when the
//! response says the session has expired.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};

use crate::cookie_store::{SharedCookieStore, compose_cookie_header};
use crate::error::ProxyError;
use crate::refresh_gate::{RefreshGate, RefreshHandle};
use crate::refresher::RefreshTrigger;
use crate::unauth::{DefaultDetector, SharedUnauthDetector};

/// Request/response hooks shared by every proxied exchange.
pub struct Interceptor {
    store: SharedCookieStore,
    gate: Arc<RefreshGate>,
    detector: SharedUnauthDetector,
}

impl Interceptor {
    pub fn new(store: SharedCookieStore, gate: Arc<RefreshGate>) -> Self {
        Self {
            store,
            gate,
            detector: Arc::new(DefaultDetector::default()),
        }
    }

    pub fn with_detector(mut self, detector: SharedUnauthDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn store(&self) -> &SharedCookieStore {
        &self.store
    }

    pub fn gate(&self) -> &Arc<RefreshGate> {
        &self.gate
    }

    /// Prepare outbound headers. Must finish before the request is sent.
    pub async fn on_request(&self, headers: &mut HeaderMap) {
        self.gate.wait().await;

        let client_cookies = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        let client_cookies = (!client_cookies.is_empty()).then_some(client_cookies);

        let Some(cookie) = compose_cookie_header(client_cookies.as_deref(), &self.store) else {
            return;
        };

        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.insert(header::COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Composed cookie header is not a valid header value");
            }
        }
    }

    /// Inspect an upstream response.
    ///
    /// Returns the refresh handle when a background refresh was triggered or
    /// joined; the caller is free to ignore it.
    pub fn on_response(
        &self,
        path: &str,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Option<RefreshHandle> {
        let merged = self.store.merge_headers(headers);
        if merged > 0 {
            tracing::debug!(path, merged, "Stored cookies from upstream response");
        }

        if !self.detector.is_unauthenticated(status, headers) {
            return None;
        }

        tracing::info!(
            path,
            status = status.as_u16(),
            "Upstream reports an expired session, refreshing credentials in background"
        );
        Some(
            self.gate
                .ensure_fresh(RefreshTrigger::Unauthenticated(status)),
        )
    }

    /// Record a transport failure for one exchange.
    pub fn on_error(&self, method: &Method, path: &str, error: &ProxyError) {
        tracing::error!(%method, path, error = %error, "Proxy error");
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("cookies", &self.store.len())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie_store::CookieStore;
    use crate::refresh_gate::tests::CountingRefresher;
    use crate::refresher::RefreshOutcome;
    use std::time::Duration;

    fn interceptor(refresher: Arc<CountingRefresher>) -> Interceptor {
        let store = Arc::new(CookieStore::new());
        let gate = Arc::new(RefreshGate::new(refresher));
        Interceptor::new(store, gate)
    }

    #[tokio::test]
    async fn test_on_request_attaches_store_cookies() {
        let interceptor = interceptor(Arc::new(CountingRefresher::default()));
        interceptor.store().merge(["a=1", "b=2"]);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("c=3"));
        interceptor.on_request(&mut headers).await;

        let cookie = headers.get(header::COOKIE).unwrap().to_str().unwrap();
        let mut pairs: Vec<&str> = cookie.split("; ").collect();
        assert_eq!(pairs[0], "c=3");
        pairs.sort();
        assert_eq!(pairs, vec!["a=1", "b=2", "c=3"]);
        assert_eq!(headers.get_all(header::COOKIE).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_on_request_joins_split_cookie_headers() {
        let interceptor = interceptor(Arc::new(CountingRefresher::default()));

        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("x=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("y=2"));
        interceptor.on_request(&mut headers).await;

        assert_eq!(headers.get(header::COOKIE).unwrap(), "x=1; y=2");
        assert_eq!(headers.get_all(header::COOKIE).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_on_request_without_cookies_leaves_headers() {
        let interceptor = interceptor(Arc::new(CountingRefresher::default()));
        let mut headers = HeaderMap::new();
        interceptor.on_request(&mut headers).await;
        assert!(headers.get(header::COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_on_request_waits_for_refresh() {
        let refresher = Arc::new(CountingRefresher::holding());
        let interceptor = Arc::new(interceptor(refresher.clone()));
        let _refresh = interceptor.gate().ensure_fresh(RefreshTrigger::Startup);

        let pending = {
            let interceptor = interceptor.clone();
            tokio::spawn(async move {
                let mut headers = HeaderMap::new();
                interceptor.on_request(&mut headers).await;
                headers
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        // The refresh lands a cookie before the request is released.
        interceptor.store().merge(["session=fresh"]);
        refresher.release.notify_one();

        let headers = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(headers.get(header::COOKIE).unwrap(), "session=fresh");
    }

    #[tokio::test]
    async fn test_on_response_merges_regardless_of_status() {
        let interceptor = interceptor(Arc::new(CountingRefresher::default()));
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("rotated=2; Path=/"));

        assert!(interceptor
            .on_response("/api/x", StatusCode::OK, &headers)
            .is_none());
        assert_eq!(interceptor.store().get("rotated").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_on_response_401_triggers_refresh() {
        let refresher = Arc::new(CountingRefresher::default());
        let interceptor = interceptor(refresher.clone());

        let handle = interceptor
            .on_response("/api/x", StatusCode::UNAUTHORIZED, &HeaderMap::new())
            .expect("401 should trigger a refresh");
        assert_eq!(handle.await, RefreshOutcome::Refreshed { cookies: 1 });
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_burst_of_401s_refreshes_once() {
        let refresher = Arc::new(CountingRefresher::holding());
        let interceptor = interceptor(refresher.clone());

        let handles: Vec<_> = (0..5)
            .filter_map(|_| {
                interceptor.on_response("/api/x", StatusCode::UNAUTHORIZED, &HeaderMap::new())
            })
            .collect();
        assert_eq!(handles.len(), 5);

        tokio::task::yield_now().await;
        refresher.release.notify_one();
        futures::future::join_all(handles).await;
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_detector() {
        let refresher = Arc::new(CountingRefresher::default());
        let interceptor = interceptor(refresher.clone())
            .with_detector(Arc::new(|status: StatusCode, _: &HeaderMap| {
                status == StatusCode::FORBIDDEN
            }));

        assert!(interceptor
            .on_response("/api", StatusCode::UNAUTHORIZED, &HeaderMap::new())
            .is_none());
        assert!(interceptor
            .on_response("/api", StatusCode::FORBIDDEN, &HeaderMap::new())
            .is_some());
    }
}
