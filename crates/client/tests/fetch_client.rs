use std::time::Duration;

use swcache_client::{FetchClient, FetchConfig, Fetcher};
use swcache_core::{Error, Request};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(config: FetchConfig) -> FetchClient {
    FetchClient::new(config).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(r#"[{"id":1}]"#),
        )
        .mount(&server)
        .await;

    let response = client(FetchConfig::default())
        .fetch(&Request::get(format!("{}/api/users?_dc=5", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.body().as_ref(), br#"[{"id":1}]"#);
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    assert!(response.is_cacheable());
}

#[tokio::test]
async fn test_error_status_is_a_response() {
    let server = MockServer::start().await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let response = client(FetchConfig::default())
        .fetch(&Request::get(format!("{}/broken", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    assert!(!response.is_cacheable());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(path("/big.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let err = client(FetchConfig { max_bytes: 1024, ..Default::default() })
        .fetch(&Request::get(format!("{}/big.bin", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FetchTooLarge(_)), "unexpected error: {err}");
    assert!(!err.is_network_failure());
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = client(FetchConfig { timeout: Duration::from_millis(200), ..Default::default() })
        .fetch(&Request::get(format!("{}/slow", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FetchTimeout(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn test_method_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(FetchConfig::default())
        .fetch(&Request::new("post", format!("{}/api/save", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_stopped_server_is_network_failure() {
    let server = MockServer::builder().start().await;
    let url = format!("{}/gone", server.uri());
    drop(server);

    let err = client(FetchConfig { timeout: Duration::from_secs(2), ..Default::default() })
        .fetch(&Request::get(url))
        .await
        .unwrap_err();
    assert!(err.is_network_failure(), "unexpected error: {err}");
}
