//! Classifies proxied responses that mean "the session is gone".

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode, header};
use url::Url;

/// Pure predicate over a response's status and headers.
///
/// Implementations must be side-effect free; they are called concurrently
/// from every in-flight response handler.
pub trait UnauthDetector: Send + Sync {
    fn is_unauthenticated(&self, status: StatusCode, headers: &HeaderMap) -> bool;
}

impl<F> UnauthDetector for F
where
    F: Fn(StatusCode, &HeaderMap) -> bool + Send + Sync,
{
    fn is_unauthenticated(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        self(status, headers)
    }
}

pub type SharedUnauthDetector = Arc<dyn UnauthDetector>;

/// Status/redirect based detector.
///
/// Fires for any status in `statuses`, or for a status in
/// `redirect_statuses` whose `Location` path contains one of
/// `location_markers` (compared case-insensitively). Query and fragment are
/// not looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultDetector {
    pub statuses: Vec<u16>,
    pub redirect_statuses: Vec<u16>,
    pub location_markers: Vec<String>,
}

impl Default for DefaultDetector {
    fn default() -> Self {
        Self {
            statuses: vec![401],
            redirect_statuses: vec![302],
            location_markers: vec!["/login/".to_string(), "/sso/".to_string()],
        }
    }
}

impl UnauthDetector for DefaultDetector {
    fn is_unauthenticated(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        let code = status.as_u16();
        if self.statuses.contains(&code) {
            return true;
        }
        if !self.redirect_statuses.contains(&code) {
            return false;
        }

        let Some(location) = headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let path = location_path(location).to_ascii_lowercase();
        self.location_markers
            .iter()
            .any(|marker| path.contains(&marker.to_ascii_lowercase()))
    }
}

/// Path component of a `Location` value, absolute or relative.
fn location_path(location: &str) -> String {
    if let Ok(url) = Url::parse(location) {
        return url.path().to_string();
    }
    let end = location.find(['?', '#']).unwrap_or(location.len());
    location[..end].to_string()
}

/// The default policy: 401, or a 302 towards a login/SSO page.
pub fn is_unauthenticated(status: StatusCode, headers: &HeaderMap) -> bool {
    DefaultDetector::default().is_unauthenticated(status, headers)
}
