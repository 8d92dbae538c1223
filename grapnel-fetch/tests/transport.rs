//! Reqwest transport and API client against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use grapnel_core::{CredentialBundle, PlatformConfig};
use grapnel_fetch::{
    ApiClient, FetchError, HttpRequest, HttpTransport, RateLimiter, ReqwestTransport,
    StaticCredentials,
};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> ReqwestTransport {
    ReqwestTransport::new("grapnel-test/1.0").unwrap()
}

fn bundle() -> CredentialBundle {
    let cookies = [
        ("sessionid", "sess"),
        ("csrftoken", "csrf"),
        ("ds_user_id", "42"),
        ("rur", "r"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let now = Utc::now();
    CredentialBundle::new(cookies, now, now + chrono::Duration::days(30)).unwrap()
}

fn platform(server: &MockServer) -> PlatformConfig {
    PlatformConfig {
        base_url: server.uri(),
        ..PlatformConfig::default()
    }
}

#[tokio::test]
async fn test_get_sends_query_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "sunset"))
        .and(header("x-probe", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("found"))
        .mount(&server)
        .await;

    let request = HttpRequest::get(format!("{}/search", server.uri()))
        .query(&[("q", "sunset")])
        .header("X-Probe", "1");
    let response = transport().send(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text, "found");
}

#[tokio::test]
async fn test_post_sends_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_string_contains("code=123456"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let request = HttpRequest::post_form(
        format!("{}/submit", server.uri()),
        vec![("code".to_string(), "123456".to_string())],
    );
    let response = transport().send(request).await.unwrap();

    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_set_cookie_headers_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "sessionid=fresh; Max-Age=3600; Path=/; Secure")
                .append_header("Set-Cookie", "csrftoken=tok; Path=/"),
        )
        .mount(&server)
        .await;

    let response = transport()
        .send(HttpRequest::get(server.uri()))
        .await
        .unwrap();
    let now = Utc::now();
    let cookies = response.set_cookies(now);

    assert_eq!(cookies.len(), 2);
    let session = cookies.iter().find(|c| c.name == "sessionid").unwrap();
    assert_eq!(session.value, "fresh");
    assert!(session.secure);
    assert!(session.expires.is_some_and(|e| e > now));
}

#[tokio::test]
async fn test_request_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let request = HttpRequest::get(server.uri()).timeout(Duration::from_millis(100));
    let err = transport().send(request).await.unwrap_err();

    assert!(FetchError::from(err).is_transient());
}

#[tokio::test]
async fn test_api_client_attaches_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/media/1/info/"))
        .and(header("x-csrftoken", "csrf"))
        .and(header("x-app-id", "936619743392459"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[]}"#))
        .mount(&server)
        .await;

    let client = ApiClient::new(
        Arc::new(transport()),
        Arc::new(RateLimiter::with_limits(10, Duration::from_secs(60), Duration::ZERO)),
        Arc::new(StaticCredentials(Some(bundle()))),
        platform(&server),
    );

    let value = client.get("/api/v1/media/1/info/", &[]).await.unwrap();
    assert!(value["items"].is_array());
}

#[tokio::test]
async fn test_api_client_reports_login_wall() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<!DOCTYPE html><html><body>Please log in to continue</body></html>"),
        )
        .mount(&server)
        .await;

    let client = ApiClient::new(
        Arc::new(transport()),
        Arc::new(RateLimiter::with_limits(10, Duration::from_secs(60), Duration::ZERO)),
        Arc::new(StaticCredentials(Some(bundle()))),
        platform(&server),
    );

    let err = client.get("/api/v1/feed/", &[]).await.unwrap_err();
    assert!(err.is_blocked_content());
}
