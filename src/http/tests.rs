//! Tests for the HTTP module

use super::*;
use crate::config::{ApiConfig, HttpSettings};
use crate::error::{Error, ErrorKind};
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;
use test_case::test_case;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn limit(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

fn api() -> ApiConfig {
    ApiConfig::new("https://go.votomobile.org/api/v1/", "secret")
}

fn fetcher_for(server: &MockServer) -> HttpPageFetcher {
    let client = HttpClient::with_config(HttpClientConfig::builder().no_rate_limit().build())
        .unwrap();
    HttpPageFetcher::new(client, ApiConfig::new(server.uri(), "secret"))
}

// ============================================================================
// URL Builder Tests
// ============================================================================

#[test]
fn test_build_url_first_page() {
    let url = build_url(&api(), "trees", &RequestParams::new(limit(20))).unwrap();
    assert_eq!(
        url.as_str(),
        "https://go.votomobile.org/api/v1/trees?api_key=secret&limit=20"
    );
    assert!(extract_query_param(url.as_str(), PAGE_AFTER_PARAM).is_none());
    assert!(extract_query_param(url.as_str(), PAGE_BEFORE_PARAM).is_none());
}

#[test]
fn test_build_url_page_after() {
    let url = build_url(&api(), "trees", &RequestParams::after(limit(20), 42)).unwrap();
    assert_eq!(
        url.as_str(),
        "https://go.votomobile.org/api/v1/trees?api_key=secret&limit=20&page_after=42"
    );
    assert!(!url.as_str().contains("page_before"));
}

#[test]
fn test_build_url_page_before() {
    let url = build_url(&api(), "trees", &RequestParams::before(limit(5), 7)).unwrap();
    assert!(url.as_str().ends_with("&limit=5&page_before=7"));
    assert!(!url.as_str().contains("page_after"));
}

#[test_case("https://h/api/v1", "trees" ; "plain")]
#[test_case("https://h/api/v1/", "trees" ; "trailing slash on base")]
#[test_case("https://h/api/v1//", "/trees" ; "slashes on both sides")]
#[test_case("https://h/api/v1", "//trees" ; "double leading slash")]
fn test_build_url_slash_normalisation(base: &str, endpoint: &str) {
    let api = ApiConfig::new(base, "k");
    let url = build_url(&api, endpoint, &RequestParams::new(limit(1))).unwrap();
    assert_eq!(url.as_str(), "https://h/api/v1/trees?api_key=k&limit=1");
}

#[test]
fn test_build_url_encodes_credential() {
    let api = ApiConfig::new("https://h", "a b&c");
    let url = build_url(&api, "trees", &RequestParams::new(limit(1))).unwrap();
    assert_eq!(url.query(), Some("api_key=a+b%26c&limit=1"));
    assert_eq!(
        extract_query_param(url.as_str(), API_KEY_PARAM),
        Some("a b&c".to_string())
    );
}

#[test]
fn test_request_params_accessors() {
    let params = RequestParams::after(limit(20), 10);
    assert_eq!(params.limit(), 20);
    assert_eq!(params.page_after(), Some(10));
    assert_eq!(params.page_before(), None);
    assert_eq!(params.cursor(), Some(PageCursor::After(10)));

    let params = params.with_cursor(PageCursor::Before(3));
    assert_eq!(params.page_after(), None);
    assert_eq!(params.page_before(), Some(3));
    assert_eq!(PageCursor::Before(3).to_string(), "page_before=3");
}

#[test]
fn test_cursor_round_trip() {
    let next_url = "https://go.votomobile.org/api/v1/trees?api_key=x&limit=20&page_after=1234";
    let cursor = cursor_from_next_url(next_url).unwrap();
    let rebuilt = build_url(&api(), "trees", &RequestParams::new(limit(20)).with_cursor(cursor))
        .unwrap();

    assert_eq!(
        extract_query_param(rebuilt.as_str(), PAGE_AFTER_PARAM),
        extract_query_param(next_url, PAGE_AFTER_PARAM)
    );
}

// ============================================================================
// Cursor Extraction Tests
// ============================================================================

#[test_case("https://h/x?page_after=10", Some("10") ; "only param")]
#[test_case("https://h/x?a=1&page_after=10&b=2", Some("10") ; "middle param")]
#[test_case("https://h/x?page_after=10#frag", Some("10") ; "fragment stripped")]
#[test_case("https://h/x?q=a+b&page_after=x+y", Some("x y") ; "plus decodes to space")]
#[test_case("https://h/x?page_after=", None ; "empty value")]
#[test_case("https://h/x?page_afterwards=3", None ; "prefix does not match")]
#[test_case("https://h/x", None ; "no query")]
#[test_case("/relative?page_after=5", Some("5") ; "relative url")]
fn test_extract_query_param(url: &str, expected: Option<&str>) {
    assert_eq!(
        extract_query_param(url, PAGE_AFTER_PARAM).as_deref(),
        expected
    );
}

#[test]
fn test_cursor_from_next_url_prefers_page_after() {
    let cursor = cursor_from_next_url("https://h/x?page_before=1&page_after=9").unwrap();
    assert_eq!(cursor, PageCursor::After(9));

    let cursor = cursor_from_next_url("https://h/x?page_before=1").unwrap();
    assert_eq!(cursor, PageCursor::Before(1));
}

#[test]
fn test_cursor_from_next_url_rejects_garbage() {
    let err = cursor_from_next_url("https://h/x?page_after=abc").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);

    let err = cursor_from_next_url("https://h/x?limit=20").unwrap_err();
    assert!(err.to_string().contains("no page cursor"));
}

#[test_case("https://h/trees?api_key=SUPERSECRETKEY&page_after=abc" ; "absolute bad cursor")]
#[test_case("https://h/trees?api_key=SUPERSECRETKEY&limit=20" ; "absolute no cursor")]
#[test_case("/trees?api_key=SUPERSECRETKEY&page_before=x" ; "relative bad cursor")]
fn test_cursor_errors_mask_credential(next_url: &str) {
    let err = cursor_from_next_url(next_url).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert!(!err.to_string().contains("SUPERSECRETKEY"));
}

#[test]
fn test_redact_url() {
    let url = build_url(&api(), "trees", &RequestParams::after(limit(2), 4)).unwrap();
    let shown = redact_url(&url);
    assert!(!shown.contains("secret"));
    assert!(shown.contains("page_after=4"));

    let plain = url::Url::parse("https://h/x?limit=1").unwrap();
    assert_eq!(redact_url(&plain), "https://h/x?limit=1");
}

// ============================================================================
// Page Body Tests
// ============================================================================

#[test]
fn test_page_body_next_url() {
    let body = PageBody::parse(
        r#"{"data": {"trees": [{"id": 1}]}, "pagination": {"nextURL": "https://h/t?page_after=1"}}"#,
    )
    .unwrap();
    assert_eq!(body.next_url(), Some("https://h/t?page_after=1"));
    assert!(body.has_next());
    assert_eq!(body.records("trees").unwrap().len(), 1);
    assert!(body.records("surveys").is_none());
}

#[test_case(r#"{"data": {}}"# ; "no pagination block")]
#[test_case(r#"{"data": {}, "pagination": null}"# ; "null pagination")]
#[test_case(r#"{"data": {}, "pagination": {"nextURL": null}}"# ; "null next url")]
#[test_case(r#"{"data": {}, "pagination": {"nextURL": ""}}"# ; "empty next url")]
#[test_case(r#"{"pagination": {"previousURL": "https://h"}}"# ; "only previous url")]
fn test_page_body_last_page(body: &str) {
    let body = PageBody::parse(body).unwrap();
    assert!(!body.has_next());
}

#[test]
fn test_page_body_keeps_extra_fields() {
    let body =
        PageBody::parse(r#"{"status": "success", "code": 200, "data": {"trees": []}}"#).unwrap();
    assert_eq!(body.extra.get("status"), Some(&json!("success")));
    assert_eq!(body.extra.get("code"), Some(&json!(200)));
}

#[test_case("not json" ; "not json")]
#[test_case("[1, 2]" ; "array body")]
#[test_case("null" ; "null body")]
#[test_case(r#"{"data": [1]}"# ; "data not an object")]
#[test_case(r#"{"data": {}, "pagination": {"nextURL": 5}}"# ; "next url not a string")]
fn test_page_body_malformed(body: &str) {
    let err = PageBody::parse(body).unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}

// ============================================================================
// HTTP Client Tests
// ============================================================================

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert!(config.rate_limit.is_none());
    assert!(config.user_agent.starts_with("voto-relay/"));
}

#[test]
fn test_http_client_config_from_settings() {
    let settings = HttpSettings {
        timeout_secs: 5,
        user_agent: Some("relay-test/1.0".to_string()),
        requests_per_second: Some(3),
    };
    let config = HttpClientConfig::from_settings(&settings);
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.user_agent, "relay-test/1.0");
    assert_eq!(config.rate_limit, Some(RateLimiterConfig::per_second(3)));

    let client = HttpClient::with_config(config).unwrap();
    assert!(client.has_rate_limiter());
}

#[tokio::test]
async fn test_http_client_sends_default_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(wiremock::matchers::header("X-Relay", "1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client =
        HttpClient::with_config(HttpClientConfig::builder().header("X-Relay", "1").build())
            .unwrap();
    let url = url::Url::parse(&format!("{}/ping", mock_server.uri())).unwrap();
    let response = client.get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_http_client_status_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpClient::new().unwrap();
    let url = url::Url::parse(&format!("{}/flaky", mock_server.uri())).unwrap();
    let err = client.get(&url).await.unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 503, ref body } if body == "down"));
    assert!(err.is_transport());
}

// ============================================================================
// Page Fetcher Tests
// ============================================================================

#[tokio::test]
async fn test_fetcher_builds_query_and_parses_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trees"))
        .and(query_param("api_key", "secret"))
        .and(query_param("limit", "20"))
        .and(query_param("page_after", "10"))
        .and(query_param_is_missing("page_before"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"trees": [{"id": 11, "title": "Elm"}]},
            "pagination": {"nextURL": null}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server);
    let page = fetcher
        .fetch("/trees", &RequestParams::after(limit(20), 10))
        .await
        .unwrap();

    assert_eq!(page.metadata.status, 200);
    assert_eq!(page.metadata.request.page_after(), Some(10));
    assert!(page.metadata.url.contains("page_after=10"));
    assert!(!page.metadata.url.contains("secret"));
    assert_eq!(
        page.metadata.content_type.as_deref(),
        Some("application/json")
    );
    assert_eq!(page.body.records("trees").unwrap()[0]["title"], "Elm");
    assert!(!page.body.has_next());
}

#[tokio::test]
async fn test_fetcher_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trees"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server);
    let err = fetcher
        .fetch("trees", &RequestParams::new(limit(20)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_fetcher_http_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trees"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server);
    let err = fetcher
        .fetch("trees", &RequestParams::new(limit(20)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 401, .. }));
}

#[tokio::test]
async fn test_fetcher_transport_error() {
    // Bind then drop a listener so the port is closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new().unwrap();
    let fetcher = HttpPageFetcher::new(
        client,
        ApiConfig::new(format!("http://{addr}"), "SUPERSECRETKEY"),
    );
    let err = fetcher
        .fetch("trees", &RequestParams::new(limit(20)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(!err.to_string().contains("SUPERSECRETKEY"));
    assert!(!format!("{err:?}").contains("SUPERSECRETKEY"));
}
