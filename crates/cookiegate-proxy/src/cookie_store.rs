//! Process-wide cookie jar shared by the refresher and every proxied request.
//!
//! Only the `name=value` pair of each `Set-Cookie` is kept. Attributes
//! (Domain, Path, Expires, flags) are dropped: the store exists to forward
//! the session to the remote origin, not to replicate browser cookie rules.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, header};
use parking_lot::RwLock;

/// In-memory cookie name → value mapping.
#[derive(Debug, Default)]
pub struct CookieStore {
    cookies: RwLock<HashMap<String, String>>,
}

/// Shared handle to the cookie store.
pub type SharedCookieStore = Arc<CookieStore>;

impl CookieStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge raw `Set-Cookie` header values into the store.
    ///
    /// Each value is cut at the first `;`, then split at the first `=`.
    /// Entries without `=` are skipped. Returns the number of pairs stored.
    pub fn merge<I, S>(&self, set_cookies: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = set_cookies
            .into_iter()
            .filter_map(|raw| parse_set_cookie(raw.as_ref()))
            .collect();

        if pairs.is_empty() {
            return 0;
        }

        let count = pairs.len();
        let mut cookies = self.cookies.write();
        for (name, value) in pairs {
            cookies.insert(name, value);
        }
        count
    }

    /// Merge every `Set-Cookie` header found in a header map.
    pub fn merge_headers(&self, headers: &HeaderMap) -> usize {
        self.merge(
            headers
                .get_all(header::SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        )
    }

    /// Render all entries as a single `Cookie` header value.
    pub fn to_header_string(&self) -> String {
        let cookies = self.cookies.read();
        cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Look up a single cookie value.
    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies.read().get(name).cloned()
    }

    /// Whether the store holds a cookie with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.cookies.read().contains_key(name)
    }

    /// Names of all stored cookies, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cookies.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }
}

/// Parse one `Set-Cookie` value into its name/value pair.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Combine the client's own `Cookie` header with the store's rendering.
///
/// Client pairs whose name the store also holds are dropped so the result
/// never carries the same name twice. Empty parts are skipped; `None`
/// means there is nothing to send.
pub fn compose_cookie_header(client: Option<&str>, store: &CookieStore) -> Option<String> {
    let client_part = client
        .map(|c| {
            c.split(';')
                .map(str::trim)
                .filter(|pair| !pair.is_empty())
                .filter(|pair| {
                    let name = pair.split_once('=').map_or(*pair, |(n, _)| n).trim();
                    !store.contains(name)
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default();
    let store_part = store.to_header_string();

    let combined = [client_part, store_part]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("; ");

    if combined.is_empty() {
        None
    } else {
        Some(combined)
    }
}
