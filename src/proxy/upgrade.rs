//! Protocol-upgrade requests over a dedicated upstream connection.
//!
//! Requests carrying `Upgrade` never use the pooled client: a fresh
//! HTTP/1.1 connection is opened to the target, the handshake request is
//! sent on it, and on `101 Switching Protocols` both the client and the
//! upstream connection are upgraded and spliced together in a spawned
//! task. The connection is dropped when either side closes, and the
//! backend lease is held until then.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::time::Instant;
use tower::ServiceExt;

use crate::error::PoolRouteError;
use crate::pool::backend_set::BackendLease;
use crate::server::HttpsConnector;

use super::relay::RelayBody;

/// Send `request` (already carrying the upstream URI and headers) over a
/// new connection to the leased backend. `client_side` is the inbound
/// request's pending upgrade. A non-`101` answer is relayed like any
/// other response, under `deadline`.
pub async fn open_tunnel(
    connector: HttpsConnector,
    request: Request<Body>,
    client_side: hyper::upgrade::OnUpgrade,
    lease: BackendLease,
    deadline: Instant,
    correlation_id: String,
) -> Result<Response<Body>, PoolRouteError> {
    let target = lease.target.clone();
    let authority = target.authority()?;
    let connect_uri = Uri::builder()
        .scheme(target.uri_scheme())
        .authority(authority)
        .path_and_query("/")
        .build()
        .map_err(|e| PoolRouteError::UriParse {
            source: Box::new(e),
        })?;

    let io = connector
        .oneshot(connect_uri)
        .await
        .map_err(|source| PoolRouteError::HttpRequest { source })?;

    let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| PoolRouteError::HttpRequest {
            source: Box::new(e),
        })?;

    let conn_target = target.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            tracing::debug!(target = %conn_target, error = %e, "upgrade connection closed with error");
        }
    });

    // A dedicated connection speaks origin-form.
    let (mut parts, body) = request.into_parts();
    parts.uri = parts
        .uri
        .path_and_query()
        .map_or_else(|| Uri::from_static("/"), |pq| {
            Uri::try_from(pq.as_str()).unwrap_or_else(|_| Uri::from_static("/"))
        });

    let mut response = sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| PoolRouteError::HttpRequest {
            source: Box::new(e),
        })?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Ok(RelayBody::wrap(response, lease, deadline));
    }

    let upstream_side = hyper::upgrade::on(&mut response);
    let tunnel_target = target.to_string();
    tokio::spawn(async move {
        let _lease = lease;
        match tokio::try_join!(client_side, upstream_side) {
            Ok((client, upstream)) => {
                let mut client = TokioIo::new(client);
                let mut upstream = TokioIo::new(upstream);
                match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                    Ok((up, down)) => tracing::debug!(
                        correlation_id = %correlation_id,
                        target = %tunnel_target,
                        bytes_up = up,
                        bytes_down = down,
                        "upgraded connection closed"
                    ),
                    Err(e) => tracing::debug!(
                        correlation_id = %correlation_id,
                        target = %tunnel_target,
                        error = %e,
                        "upgraded connection aborted"
                    ),
                }
            }
            Err(e) => tracing::warn!(
                correlation_id = %correlation_id,
                target = %tunnel_target,
                error = %e,
                "protocol upgrade failed"
            ),
        }
    });

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
