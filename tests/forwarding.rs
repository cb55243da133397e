//! Integration tests for forwarding requests to pool backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use poolroute::balance::{Algorithm, HostSelectorRegistry};
use poolroute::config::model::ProxyDefaults;
use poolroute::config::sources::memory::MemoryStore;
use poolroute::pool::{BackendSet, PoolDeps, Target};
use poolroute::proxy::client::ForwardingClient;
use poolroute::proxy::headers::CORRELATION_ID;
use poolroute::proxy::vhost::VirtualHosts;
use poolroute::server::{self, AppState};

fn deps(defaults: ProxyDefaults) -> Arc<PoolDeps> {
    Arc::new(PoolDeps::new(Arc::new(MemoryStore::new()), defaults))
}

fn client_for(targets: &[String], defaults: ProxyDefaults) -> ForwardingClient {
    let backends = Arc::new(BackendSet::with_connection_limit(
        defaults.connections_per_host,
    ));
    for t in targets {
        backends.add(Target::parse(t).unwrap());
    }
    ForwardingClient::new(
        "test",
        backends,
        Arc::new(HostSelectorRegistry::new(Algorithm::RoundRobin)),
        deps(defaults),
    )
}

/// Upstream that echoes the interesting request headers back as JSON.
async fn start_echo_upstream() -> SocketAddr {
    let app = axum::Router::new().fallback(|headers: HeaderMap, uri: axum::http::Uri| async move {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        axum::Json(serde_json::json!({
            "uri": uri.to_string(),
            "host": get("host"),
            "x-forwarded-for": get("x-forwarded-for"),
            "x-forwarded-proto": get("x-forwarded-proto"),
            "x-forwarded-host": get("x-forwarded-host"),
            "via": get("via"),
            "x-correlation-id": get("x-correlation-id"),
            "x-secret": get("x-secret"),
            "content-type": get("content-type"),
        }))
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn unused_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn json_body(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn empty_backend_set_returns_502() {
    let client = client_for(&[], ProxyDefaults::default());
    let request = Request::builder()
        .uri("/")
        .header(CORRELATION_ID, "cid-empty")
        .body(Body::empty())
        .unwrap();

    let response = client.forward(request).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers().get(CORRELATION_ID).unwrap(), "cid-empty");
}

#[tokio::test]
async fn unreachable_upstream_returns_502() {
    let addr = unused_port().await;
    let client = client_for(&[format!("http://{addr}")], ProxyDefaults::default());

    let response = client
        .forward(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn slow_upstream_times_out_with_502() {
    let app = axum::Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let defaults = ProxyDefaults {
        timeout: 200,
        ..ProxyDefaults::default()
    };
    let client = client_for(&[format!("http://{addr}")], defaults);

    let started = std::time::Instant::now();
    let response = client
        .forward(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn forwards_path_query_and_proxy_headers() {
    let upstream = start_echo_upstream().await;
    let client = client_for(&[format!("http://{upstream}")], ProxyDefaults::default());

    let mut request = Request::builder()
        .uri("/cart/items?page=2")
        .header("host", "shop.example.com")
        .header("content-type", "application/json")
        .header("connection", "x-secret")
        .header("x-secret", "hunter2")
        .header(CORRELATION_ID, "cid-42")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo::<SocketAddr>("192.0.2.10:5555".parse().unwrap()));

    let response = client.forward(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let seen = json_body(response).await;

    assert_eq!(seen["uri"], "/cart/items?page=2");
    assert_eq!(seen["host"], "shop.example.com");
    assert_eq!(seen["x-forwarded-for"], "192.0.2.10");
    assert_eq!(seen["x-forwarded-proto"], "http");
    assert_eq!(seen["x-forwarded-host"], "shop.example.com");
    assert_eq!(seen["via"], "1.1 poolroute");
    assert_eq!(seen["x-correlation-id"], "cid-42");
    assert_eq!(seen["content-type"], "application/json");
    assert!(seen["x-secret"].is_null());
}

#[tokio::test]
async fn missing_host_is_filled_from_target() {
    let upstream = start_echo_upstream().await;
    let client = client_for(&[format!("http://{upstream}")], ProxyDefaults::default());

    let response = client
        .forward(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;
    let seen = json_body(response).await;
    assert_eq!(seen["host"], upstream.to_string());
}

/// Raw TCP upstream that sends the response head and a first `hello`
/// chunk, then finishes with `world` once `release` fires.
async fn start_chunked_upstream(release: oneshot::Receiver<()>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  transfer-encoding: chunked\r\n\r\n\
                  5\r\nhello\r\n",
            )
            .await
            .unwrap();
        if release.await.is_ok() {
            socket
                .write_all(b"5\r\nworld\r\n0\r\n\r\n")
                .await
                .unwrap();
        }
        // Hold the socket open until the proxy is done with it.
        let _ = socket.read(&mut buf).await;
    });
    addr
}

#[tokio::test]
async fn in_flight_count_returns_to_zero() {
    let upstream = start_echo_upstream().await;
    let client = client_for(&[format!("http://{upstream}")], ProxyDefaults::default());

    let response = client
        .forward(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await;
    let snapshot = client.backends().snapshot();
    assert_eq!(snapshot[0].in_flight(), 0);
}

#[tokio::test]
async fn streaming_body_keeps_backend_in_flight() {
    let (release, gate) = oneshot::channel();
    let upstream = start_chunked_upstream(gate).await;
    let client = client_for(&[format!("http://{upstream}")], ProxyDefaults::default());
    let backend = Arc::clone(&client.backends().snapshot()[0]);

    let response = client
        .forward(Request::builder().uri("/download").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend.in_flight(), 1);

    let mut body = response.into_body();
    let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
    assert_eq!(&first[..], b"hello");
    assert_eq!(backend.in_flight(), 1);

    release.send(()).unwrap();
    let rest = body.collect().await.unwrap().to_bytes();
    assert_eq!(&rest[..], b"world");
    assert_eq!(backend.in_flight(), 0);
    assert_eq!(backend.available_permits(), 2000);
}

#[tokio::test]
async fn stalled_body_is_cut_off_at_the_deadline() {
    let (_release, gate) = oneshot::channel::<()>();
    let upstream = start_chunked_upstream(gate).await;
    let defaults = ProxyDefaults {
        timeout: 300,
        ..ProxyDefaults::default()
    };
    let client = client_for(&[format!("http://{upstream}")], defaults);
    let backend = Arc::clone(&client.backends().snapshot()[0]);

    let response = client
        .forward(Request::builder().uri("/download").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let started = std::time::Instant::now();
    let result = response.into_body().collect().await;
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(backend.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connection_limit_caps_concurrent_upstream_requests() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let app = {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        axum::Router::new().fallback(move || {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                "ok"
            }
        })
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let defaults = ProxyDefaults {
        connections_per_host: 1,
        ..ProxyDefaults::default()
    };
    let client = Arc::new(client_for(&[format!("http://{addr}")], defaults));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            let response = client
                .forward(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await;
            let status = response.status();
            response.into_body().collect().await.unwrap();
            status
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    let backend = Arc::clone(&client.backends().snapshot()[0]);
    assert_eq!(backend.in_flight(), 0);
}

/// Raw TCP upstream that accepts an `Upgrade: echo` handshake and then
/// echoes every byte back.
async fn start_upgrade_echo_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                socket
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\n\
                          connection: upgrade\r\n\
                          upgrade: echo\r\n\r\n",
                    )
                    .await
                    .unwrap();
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn upgrade_requests_are_tunneled() {
    let upstream = start_upgrade_echo_upstream().await;
    let store = MemoryStore::from_pairs([(
        "pools/echo/targets/0".to_string(),
        format!("http://{upstream}"),
    )]);
    let deps = Arc::new(PoolDeps::new(Arc::new(store), ProxyDefaults::default()));
    let vhosts = VirtualHosts::new(Arc::clone(&deps)).with_default_pool("echo");
    let state = Arc::new(AppState::new(vhosts, deps));
    let router = server::build_router(state, 1_048_576);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let mut conn = tokio::net::TcpStream::connect(proxy).await.unwrap();
    conn.write_all(
        b"GET /chat HTTP/1.1\r\n\
          host: chat.example.com\r\n\
          connection: upgrade\r\n\
          upgrade: echo\r\n\r\n",
    )
    .await
    .unwrap();

    let exchange = async {
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = conn.read(&mut buf).await.unwrap();
            assert!(n > 0, "proxy closed before answering");
            head.extend_from_slice(&buf[..n]);
        }
        let head = String::from_utf8_lossy(&head).to_string();
        assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");

        conn.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        conn.read_exact(&mut echoed).await.unwrap();
        echoed
    };

    let echoed = tokio::time::timeout(Duration::from_secs(5), exchange)
        .await
        .expect("upgrade exchange timed out");
    assert_eq!(&echoed, b"ping");
}
