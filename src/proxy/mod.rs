//! Core HTTP request forwarding.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every non-`/health` request, resolves its pool through the
//! virtual-host table ([`vhost`]), and hands it to that pool's router.
//! Submodules handle upstream forwarding ([`client`]), header
//! construction ([`headers`]), response relaying ([`relay`]), and protocol
//! upgrades ([`upgrade`]).

pub mod client;
pub mod headers;
pub mod relay;
pub mod upgrade;
pub mod vhost;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::server::AppState;

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
) -> Response {
    // Pin one correlation id on the request so every later log line and
    // synthesized response agrees on it.
    let correlation_id = headers::correlation_id(request.headers());
    if let Ok(val) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert(headers::CORRELATION_ID, val);
    }

    let host = request_host(&request);
    let router = state.vhosts.router_for(host.as_deref()).await;

    tracing::debug!(
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
        host = host.as_deref().unwrap_or("-"),
        pool = router.name().unwrap_or("-"),
        "request received"
    );

    router.handle(request).await
}

/// Host the client addressed, from `Host` or an absolute-form URI.
fn request_host(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
}

/// Response generated by the proxy itself rather than an upstream.
#[must_use]
pub fn synthesized(status: StatusCode, correlation_id: &str) -> Response {
    let mut response = (status, status.canonical_reason().unwrap_or_default()).into_response();
    if let Ok(val) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert(headers::CORRELATION_ID, val);
    }
    response
}
