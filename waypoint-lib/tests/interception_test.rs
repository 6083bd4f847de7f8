//! End-to-end interception scenarios
//!
//! Drives the interceptor against local HTTP servers standing in for the
//! route service and the backend, covering the full decision surface:
//! disabled support, fresh diversion, validated return, key rotation,
//! expiry, and the transport failure taxonomy.

use axum::extract::{Request as ServerRequest, State};
use axum::response::IntoResponse;
use axum::Router;
use bytes::Bytes;
use chrono::{Duration, Utc};
use http::header::HOST;
use http::{HeaderMap, Request};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use waypoint_lib::headers::{
    APPLICATION_ID, ROUTE_SERVICE_FORWARDED_URL, ROUTE_SERVICE_METADATA, ROUTE_SERVICE_SIGNATURE,
};
use waypoint_lib::{
    build_signature_and_metadata, AesGcm, Interceptor, RouteEntry, RouteServiceConfig, RouteTable,
    Signature,
};

const KEY: &str = "ABCDEFGHIJKLMNOP";
const OTHER_KEY: &str = "QRSTUVWXYZ123456";

// ── Test servers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CapturedRequest {
    uri: String,
    headers: HeaderMap,
}

#[derive(Clone)]
struct ServerState {
    reply: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

async fn capture(State(state): State<ServerState>, request: ServerRequest) -> impl IntoResponse {
    state.requests.lock().unwrap().push(CapturedRequest {
        uri: request.uri().to_string(),
        headers: request.headers().clone(),
    });
    state.reply.clone()
}

/// Spawn a capturing HTTP server on an ephemeral port.
async fn spawn_server(reply: &str) -> (SocketAddr, Arc<Mutex<Vec<CapturedRequest>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState {
        reply: reply.to_string(),
        requests: Arc::clone(&requests),
    };
    let app = Router::new().fallback(capture).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, requests)
}

/// An address nothing is listening on.
async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn config(enabled: bool, key: &str, previous_key: Option<&str>) -> RouteServiceConfig {
    RouteServiceConfig::new(
        enabled,
        Duration::hours(1),
        AesGcm::new(key.as_bytes()).unwrap(),
        previous_key.map(|key| AesGcm::new(key.as_bytes()).unwrap()),
        false,
    )
}

fn proxy_request(host: &str, target: &str) -> Request<Bytes> {
    Request::builder()
        .method("GET")
        .uri(format!("http://{host}{target}"))
        .header(HOST, host)
        .body(Bytes::new())
        .unwrap()
}

/// Mint envelope headers under `key` for a returning request.
fn envelope(key: &str, requested_time: chrono::DateTime<Utc>, url: &str) -> (String, String) {
    let crypto = AesGcm::new(key.as_bytes()).unwrap();
    let signature = Signature {
        requested_time,
        forwarded_url: url.to_string(),
    };
    build_signature_and_metadata(&crypto, &signature).unwrap()
}

fn with_envelope(mut request: Request<Bytes>, sig: &str, meta: &str, url: &str) -> Request<Bytes> {
    let headers = request.headers_mut();
    headers.insert(ROUTE_SERVICE_SIGNATURE, sig.parse().unwrap());
    headers.insert(ROUTE_SERVICE_METADATA, meta.parse().unwrap());
    headers.insert(ROUTE_SERVICE_FORWARDED_URL, url.parse().unwrap());
    request
}

fn body_str(body: &Bytes) -> String {
    String::from_utf8_lossy(body).to_string()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn disabled_route_service_returns_502() {
    let mut table = RouteTable::new();
    table.register(
        "my_host.com",
        RouteEntry {
            backend: None,
            route_service_url: Some("https://127.0.0.1:1".to_string()),
            is_route_service: false,
        },
    );
    let interceptor = Interceptor::new(config(false, KEY, None), Arc::new(table)).unwrap();

    let response = interceptor.handle(proxy_request("my_host.com", "/")).await;

    assert_eq!(response.status(), 502);
    assert!(body_str(response.body()).contains("Support for route services is disabled."));
}

#[tokio::test]
async fn fresh_request_is_diverted_to_route_service() {
    let (rs_addr, rs_requests) = spawn_server("My Special Snowflake Route Service").await;

    let mut table = RouteTable::new();
    table.register(
        "my_host.com",
        RouteEntry::with_route_service("127.0.0.1:1", format!("http://{rs_addr}")),
    );
    let cfg = config(true, KEY, None);
    let interceptor = Interceptor::new(cfg.clone(), Arc::new(table)).unwrap();

    let target = "/resource+9-9_9?query=123&query$2=345";
    let mut request = proxy_request("my_host.com", target);
    request
        .headers_mut()
        .insert(APPLICATION_ID, "some-app-guid".parse().unwrap());

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 200);
    assert!(body_str(response.body()).contains("My Special Snowflake Route Service"));

    let captured = rs_requests.lock().unwrap();
    assert_eq!(captured.len(), 1);
    let seen = &captured[0];

    // The route service sees the original path and query untouched
    assert_eq!(seen.uri, target);
    // ... the original URL echoed in plaintext
    assert_eq!(
        seen.headers
            .get(ROUTE_SERVICE_FORWARDED_URL)
            .unwrap()
            .to_str()
            .unwrap(),
        format!("http://my_host.com{target}")
    );
    // ... a valid envelope
    cfg.validate_signature(&seen.headers).unwrap();
    // ... no application identifier
    assert!(seen.headers.get(APPLICATION_ID).is_none());
    // ... and the Host of the route service itself
    assert_eq!(
        seen.headers.get(HOST).unwrap().to_str().unwrap(),
        rs_addr.to_string()
    );
}

#[tokio::test]
async fn returning_request_reaches_backend_with_envelope_stripped() {
    let (backend_addr, backend_requests) = spawn_server("backend instance").await;

    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service(backend_addr.to_string(), "https://rs.example.com"),
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let url = "http://test/my_path";
    let (sig, meta) = envelope(KEY, Utc::now(), url);
    let request = with_envelope(proxy_request("test", "/my_path"), &sig, &meta, url);

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 200);
    assert!(body_str(response.body()).contains("backend instance"));

    let captured = backend_requests.lock().unwrap();
    assert_eq!(captured.len(), 1);
    let seen = &captured[0];
    assert!(seen.headers.get(ROUTE_SERVICE_SIGNATURE).is_none());
    assert!(seen.headers.get(ROUTE_SERVICE_METADATA).is_none());
    assert!(seen.headers.get(ROUTE_SERVICE_FORWARDED_URL).is_none());
}

#[tokio::test]
async fn envelope_minted_under_previous_key_still_validates() {
    let (backend_addr, _) = spawn_server("backend instance").await;

    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service(backend_addr.to_string(), "https://rs.example.com"),
    );
    let interceptor =
        Interceptor::new(config(true, OTHER_KEY, Some(KEY)), Arc::new(table)).unwrap();

    let url = "http://test/my_path";
    let (sig, meta) = envelope(KEY, Utc::now(), url);
    let request = with_envelope(proxy_request("test", "/my_path"), &sig, &meta, url);

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 200);
    assert!(body_str(response.body()).contains("backend instance"));
}

#[tokio::test]
async fn envelope_under_wrong_key_without_previous_returns_400() {
    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service("127.0.0.1:1", "https://rs.example.com"),
    );
    let interceptor = Interceptor::new(config(true, OTHER_KEY, None), Arc::new(table)).unwrap();

    let url = "http://test/my_path";
    let (sig, meta) = envelope(KEY, Utc::now(), url);
    let request = with_envelope(proxy_request("test", "/my_path"), &sig, &meta, url);

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 400);
    assert!(body_str(response.body()).contains("Failed to validate Route Service Signature"));
}

#[tokio::test]
async fn expired_envelope_returns_400() {
    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service("127.0.0.1:1", "https://rs.example.com"),
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let url = "http://test/my_path";
    let (sig, meta) = envelope(KEY, Utc::now() - Duration::hours(10), url);
    let request = with_envelope(proxy_request("test", "/my_path"), &sig, &meta, url);

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 400);
    assert!(body_str(response.body()).contains("Failed to validate Route Service Signature"));
}

#[tokio::test]
async fn signature_without_metadata_returns_400() {
    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service("127.0.0.1:1", "https://rs.example.com"),
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let url = "http://test/my_path";
    let (sig, _) = envelope(KEY, Utc::now(), url);
    let mut request = proxy_request("test", "/my_path");
    request
        .headers_mut()
        .insert(ROUTE_SERVICE_SIGNATURE, sig.parse().unwrap());

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 400);
    assert!(body_str(response.body()).contains("Failed to validate Route Service Signature"));
}

#[tokio::test]
async fn unparseable_route_service_url_returns_500() {
    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service("127.0.0.1:1", "https://bad hostname.com"),
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let response = interceptor.handle(proxy_request("test", "/my_path")).await;

    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn unreachable_route_service_returns_502() {
    let dead = dead_addr().await;

    let mut table = RouteTable::new();
    table.register(
        "my_host.com",
        RouteEntry::with_route_service("127.0.0.1:1", format!("http://{dead}")),
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let response = interceptor.handle(proxy_request("my_host.com", "/")).await;

    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn route_service_failing_tls_handshake_returns_502() {
    use tokio::io::AsyncWriteExt;

    // A raw TCP listener that never speaks TLS: the verify-on client's
    // handshake fails and the proxy answers 502, the same mapping as a
    // certificate from an unknown authority.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await;
            let _ = stream.shutdown().await;
        }
    });

    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry::with_route_service("127.0.0.1:1", format!("https://{addr}")),
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let response = interceptor.handle(proxy_request("test", "/my_path")).await;

    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn validated_request_without_backend_returns_502() {
    let mut table = RouteTable::new();
    table.register(
        "mybadapp.com",
        RouteEntry {
            backend: None,
            route_service_url: Some("https://rs.example.com".to_string()),
            is_route_service: false,
        },
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let url = "http://mybadapp.com/";
    let (sig, meta) = envelope(KEY, Utc::now(), url);
    let request = with_envelope(proxy_request("mybadapp.com", "/"), &sig, &meta, url);

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let interceptor =
        Interceptor::new(config(true, KEY, None), Arc::new(RouteTable::new())).unwrap();

    let response = interceptor.handle(proxy_request("nowhere.com", "/")).await;

    assert_eq!(response.status(), 404);
    assert!(body_str(response.body()).contains("does not exist"));
}

#[tokio::test]
async fn route_service_registered_as_backend_keeps_signature_header() {
    let (rs_addr, rs_requests) = spawn_server("route service instance").await;

    // The backend is itself a route service: registered as a plain route
    // with the pass-through flag, no route service URL of its own.
    let mut table = RouteTable::new();
    table.register(
        "test/my_path",
        RouteEntry {
            backend: Some(rs_addr.to_string()),
            route_service_url: None,
            is_route_service: true,
        },
    );
    let interceptor = Interceptor::new(config(true, KEY, None), Arc::new(table)).unwrap();

    let mut request = proxy_request("test", "/my_path");
    request
        .headers_mut()
        .insert(ROUTE_SERVICE_SIGNATURE, "some-signature".parse().unwrap());

    let response = interceptor.handle(request).await;

    assert_eq!(response.status(), 200);
    assert!(body_str(response.body()).contains("route service instance"));

    let captured = rs_requests.lock().unwrap();
    assert_eq!(
        captured[0]
            .headers
            .get(ROUTE_SERVICE_SIGNATURE)
            .unwrap()
            .to_str()
            .unwrap(),
        "some-signature"
    );
}

#[tokio::test]
async fn reload_swaps_config_atomically() {
    let (rs_addr, _) = spawn_server("route service reply").await;

    let mut table = RouteTable::new();
    table.register(
        "my_host.com",
        RouteEntry::with_route_service("127.0.0.1:1", format!("http://{rs_addr}")),
    );
    let interceptor = Interceptor::new(config(false, KEY, None), Arc::new(table)).unwrap();

    let response = interceptor.handle(proxy_request("my_host.com", "/")).await;
    assert_eq!(response.status(), 502);

    interceptor.reload(config(true, KEY, None)).unwrap();

    let response = interceptor.handle(proxy_request("my_host.com", "/")).await;
    assert_eq!(response.status(), 200);
}
