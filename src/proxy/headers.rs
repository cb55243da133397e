//! Header forwarding and hop-by-hop stripping.
//!
//! [`build_forwarded_headers`] clones the client headers, strips
//! hop-by-hop headers (including any listed in `Connection`), keeps the
//! client's `Host`, and adds proxy metadata (`X-Forwarded-For`,
//! `X-Forwarded-Proto`, `X-Forwarded-Host`, `Via`, `X-Correlation-Id`).
//! Upgrade requests keep `Connection` and `Upgrade` so the upstream can
//! complete the handshake.

use std::net::IpAddr;
use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::model::ProxyDefaults;
use crate::pool::target::Target;

pub const CORRELATION_ID: &str = "x-correlation-id";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-connection",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// The client's correlation id, or a fresh one when it sent none.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

/// Whether the request asks to switch protocols.
#[must_use]
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
}

/// Header names listed as tokens in `Connection`.
fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| token.trim().parse::<HeaderName>().ok())
        .collect()
}

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in connection_tokens(headers) {
        headers.remove(&name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    client_ip: Option<IpAddr>,
    target: &Target,
    defaults: &ProxyDefaults,
    correlation_id: &str,
) -> HeaderMap {
    let mut headers = original.clone();
    let upgrade = is_upgrade_request(original);

    if defaults.strip_hop_by_hop {
        let keep_upgrade = upgrade.then(|| original.get(header::UPGRADE).cloned()).flatten();
        strip_hop_by_hop(&mut headers);
        if let Some(protocol) = keep_upgrade {
            headers.insert(header::UPGRADE, protocol);
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
        }
    }

    // Keep the client's Host; only fill it in when the client sent none.
    if !headers.contains_key(header::HOST) {
        if let Ok(val) = HeaderValue::from_str(&target.host_port()) {
            headers.insert(header::HOST, val);
        }
    }

    if defaults.proxy_headers {
        if let Some(ip) = client_ip {
            let client_ip = ip.to_string();
            let xff = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .map_or_else(
                    || client_ip.clone(),
                    |existing| format!("{existing}, {client_ip}"),
                );
            if let Ok(val) = HeaderValue::from_str(&xff) {
                headers.insert("x-forwarded-for", val);
            }
        }

        // The listener is plain HTTP; keep an upstream-facing proxy's value.
        if !headers.contains_key("x-forwarded-proto") {
            headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        }

        if let Some(original_host) = original.get(header::HOST) {
            headers.insert("x-forwarded-host", original_host.clone());
        }

        let via = headers
            .get(header::VIA)
            .and_then(|v| v.to_str().ok())
            .map_or_else(
                || "1.1 poolroute".to_string(),
                |existing| format!("{existing}, 1.1 poolroute"),
            );
        if let Ok(val) = HeaderValue::from_str(&via) {
            headers.insert(header::VIA, val);
        }

        if let Ok(val) = HeaderValue::from_str(correlation_id) {
            headers.insert(CORRELATION_ID, val);
        }
    }

    headers
}
