//! HTTP surface tests through the axum router

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use common::{bootstrap, connector_yaml, gateway, route_yaml};
use flowgate::domain::{CORRELATION_HEADER, ROLE_HEADER, TENANT_HEADER, USER_HEADER};
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn name(value: &'static str) -> HeaderName {
    HeaderName::from_static(value)
}

fn value(value: &'static str) -> HeaderValue {
    HeaderValue::from_static(value)
}

async fn server_for(upstream: &MockServer, route_extra: &str) -> TestServer {
    let yaml = bootstrap(
        &[connector_yaml("posts", &upstream.uri(), "")],
        &[route_yaml("r-1", "GET", "/posts/:id", "/posts/:id", "posts", route_extra)],
    );
    let gw = gateway(&yaml).await;
    TestServer::new(gw.router()).unwrap()
}

#[tokio::test]
async fn proxies_with_correlation_id() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/posts/7"))
        .and(header(CORRELATION_HEADER, "corr-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
        .expect(1)
        .mount(&upstream)
        .await;
    let server = server_for(&upstream, "").await;

    let response = server
        .get("/api/posts/7")
        .add_header(name(TENANT_HEADER), value("acme"))
        .add_header(name(CORRELATION_HEADER), value("corr-abc"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.headers().get(CORRELATION_HEADER).unwrap(), "corr-abc");
    assert_eq!(response.json::<Value>()["id"], 7);
}

#[tokio::test]
async fn missing_tenant_is_401_with_error_body() {
    let upstream = MockServer::start().await;
    let server = server_for(&upstream, "").await;

    let response = server.get("/api/posts/7").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let body = response.json::<Value>();
    assert_eq!(body["error"], "unauthorized");
    assert!(body["correlation_id"].is_string());
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let upstream = MockServer::start().await;
    let server = server_for(&upstream, "").await;

    let response = server.get("/api/users/7").add_header(name(TENANT_HEADER), value("acme")).await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "no_route_found");

    let response =
        server.get("/admin/posts/7").add_header(name(TENANT_HEADER), value("acme")).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn role_checks_map_to_401_and_403() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&upstream).await;
    let server = server_for(&upstream, "auth_required: true\nallowed_roles: [admin]").await;

    let response = server.get("/api/posts/1").add_header(name(TENANT_HEADER), value("acme")).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .get("/api/posts/1")
        .add_header(name(TENANT_HEADER), value("acme"))
        .add_header(name(USER_HEADER), value("u-1"))
        .add_header(name(ROLE_HEADER), value("viewer"))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = server
        .get("/api/posts/1")
        .add_header(name(TENANT_HEADER), value("acme"))
        .add_header(name(USER_HEADER), value("u-2"))
        .add_header(name(ROLE_HEADER), value("admin"))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn traversal_is_blocked_without_detail() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let server = server_for(&upstream, "").await;

    let response =
        server.get("/api/posts/%2e%2e").add_header(name(TENANT_HEADER), value("acme")).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body = response.json::<Value>();
    assert_eq!(body["error"], "ssrf_blocked");
    assert_eq!(body["message"], "request blocked");
}

#[tokio::test]
async fn cache_header_reports_hit_and_miss() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&upstream)
        .await;
    let cache = "cache:\n  enabled: true\n  ttl_seconds: 30\n  key_params: [id]";
    let server = server_for(&upstream, cache).await;

    let first = server.get("/api/posts/3").add_header(name(TENANT_HEADER), value("acme")).await;
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");

    let second = server.get("/api/posts/3").add_header(name(TENANT_HEADER), value("acme")).await;
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    assert!(second.headers().get("age").is_some());
}

#[tokio::test]
async fn health_lists_circuits() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&upstream).await;
    let server = server_for(&upstream, "").await;

    let response = server.get("/api/posts/1").add_header(name(TENANT_HEADER), value("acme")).await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let health = server.get("/healthz").await;
    health.assert_status_ok();
    let body = health.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["circuits"][0]["connector_id"], "posts");
    assert_eq!(body["circuits"][0]["consecutive_failures"], 1);
}
