//! Request/response interceptors applied around every route.
//!
//! Composition order (outermost first): security headers, audit, rate
//! limiter. The rate limiter may short-circuit with a 429; headers are
//! stamped on every response either way.

pub(crate) mod audit;
pub(crate) mod bearer;
pub(crate) mod headers;
pub(crate) mod rate_limit;

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

use super::handlers::auth::utils::extract_client_ip;

/// Best-effort client address: proxy headers first, then the socket peer.
pub(crate) fn client_ip(request: &Request) -> Option<String> {
    extract_client_ip(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
    })
}

/// Rate-limit key for the request. Unidentifiable clients share one bucket
/// rather than bypassing the limiter.
pub(crate) fn client_key(request: &Request) -> String {
    client_ip(request).unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request as HttpRequest;

    #[test]
    fn client_key_prefers_proxy_headers() {
        let request = HttpRequest::builder()
            .uri("/")
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "1.2.3.4");
    }

    #[test]
    fn client_key_falls_back_to_socket_peer() {
        let mut request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_key(&request), "10.1.2.3");
    }

    #[test]
    fn client_key_defaults_to_shared_bucket() {
        let request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");
    }
}
