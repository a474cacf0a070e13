//! HTTP forwarding to the remote origin (or the local fallback origin).

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, Uri, header};
use axum::response::Response;
use futures::StreamExt;
use url::Url;

use crate::error::Result;
use crate::interceptor::Interceptor;

/// Connection-scoped headers that must not be relayed.
pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Request headers as they should go upstream: hop-by-hop and `Host` removed.
pub(crate) fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::HOST {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Rebase the request's path and query onto `origin`.
pub(crate) fn upstream_url(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url
}

/// Forward one request and stream the answer back.
///
/// With an interceptor, the outbound cookies are composed after the refresh
/// gate settles, and the response goes through `on_response` before its
/// body is streamed to the client.
pub(crate) async fn forward(
    client: &reqwest::Client,
    origin: &Url,
    req: Request,
    interceptor: Option<&Interceptor>,
) -> Result<Response> {
    let (parts, body) = req.into_parts();
    let url = upstream_url(origin, &parts.uri);
    let mut headers = forwardable_headers(&parts.headers);

    if let Some(interceptor) = interceptor {
        interceptor.on_request(&mut headers).await;
    }

    let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
        || parts.headers.contains_key(header::TRANSFER_ENCODING);

    let mut upstream = client.request(parts.method.clone(), url).headers(headers);
    if has_body {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let response = upstream.send().await?;
    let status = response.status();
    let upstream_headers = response.headers().clone();

    if let Some(interceptor) = interceptor {
        interceptor.on_response(parts.uri.path(), status, &upstream_headers);
    }

    let stream = response
        .bytes_stream()
        .map(|result| result.map_err(std::io::Error::other));
    let mut out = Response::new(Body::from_stream(stream));
    *out.status_mut() = status;
    let out_headers = out.headers_mut();
    for (name, value) in &upstream_headers {
        if !is_hop_by_hop(name) {
            out_headers.append(name.clone(), value.clone());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_upstream_url_keeps_path_and_query() {
        let origin = Url::parse("https://dev.example.com").unwrap();
        let uri: Uri = "/api/users?page=2&q=a%20b".parse().unwrap();
        assert_eq!(
            upstream_url(&origin, &uri).as_str(),
            "https://dev.example.com/api/users?page=2&q=a%20b"
        );
    }

    #[test]
    fn test_upstream_url_cannot_change_host() {
        let origin = Url::parse("http://127.0.0.1:9000").unwrap();
        let uri: Uri = "//evil.example.com/api".parse().unwrap();
        let url = upstream_url(&origin, &uri);
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port(), Some(9000));
    }

    #[test]
    fn test_forwardable_headers_strip_hop_by_hop_and_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8787"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));

        let out = forwardable_headers(&headers);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get("keep-alive").is_none());
        assert_eq!(out.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(out.get_all(header::COOKIE).iter().count(), 2);
    }
}
