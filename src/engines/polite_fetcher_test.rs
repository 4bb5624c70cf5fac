// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> FetcherSettings {
    FetcherSettings {
        rps_per_host: 50,
        burst: 50,
        max_in_flight_per_host: 4,
        max_bytes: 1024,
        max_document_bytes: 4096,
        timeout: 5,
        retry_attempts: 3,
        user_agents: vec!["ua-one".into(), "ua-two".into(), "ua-three".into()],
    }
}

fn fetcher() -> PoliteFetcher {
    PoliteFetcher::new(&settings())
        .unwrap()
        .with_retry_policy(RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            ..RetryPolicy::fast(2)
        })
}

fn request(url: String) -> FetchRequest {
    FetchRequest::get(url, Duration::from_secs(5), 1024)
}

#[tokio::test]
async fn test_fetch_returns_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channel/100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"abc\"")
                .set_body_raw("<ul><li>招录公告</li></ul>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let response = fetcher()
        .fetch(
            &request(format!("{}/channel/100", server.uri())),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("ETag"), Some("\"abc\""));
    assert!(response.content_type().unwrap().starts_with("text/html"));
    assert!(String::from_utf8_lossy(&response.body).contains("招录公告"));
}

#[tokio::test]
async fn test_gbk_page_decoded_by_header_charset() {
    // Given: GBK 编码且页面内无 meta 声明
    let (bytes, _, _) = encoding_rs::GBK.encode("<ul><li>考试录用公务员公告</li></ul>");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gbk"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes.into_owned(), "text/html; charset=GBK"))
        .mount(&server)
        .await;

    // When
    let response = fetcher()
        .fetch(&request(format!("{}/gbk", server.uri())), &CancellationToken::new())
        .await
        .unwrap();

    // Then: 按响应头字符集解码
    let text = crate::utils::text_encoding::decode_html(&response.body, response.content_type());
    assert!(text.contains("考试录用公务员公告"));
}

#[tokio::test]
async fn test_retries_503_then_succeeds() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/flaky",
        get(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                } else {
                    "ok".into_response()
                }
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let response = fetcher()
        .fetch(
            &request(format!("http://{}/flaky", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_non_retryable_status_returned_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let response = fetcher()
        .fetch(
            &request(format!("{}/missing", server.uri())),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_payload_too_large() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let result = fetcher()
        .fetch(&request(format!("{}/big", server.uri())), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(FetchError::PayloadTooLarge { limit: 1024 })));
}

#[tokio::test]
async fn test_cancelled_request_returns_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = std::time::Instant::now();
    let result = fetcher()
        .fetch(&request(format!("{}/slow", server.uri())), &cancel)
        .await;
    assert!(matches!(result, Err(FetchError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_user_agent_is_stable_per_host() {
    let server = MockServer::start().await;
    let fetcher = fetcher();
    let host = url::Url::parse(&server.uri())
        .unwrap()
        .host_str()
        .unwrap()
        .to_string();
    let expected = fetcher.user_agent_for(&host).to_string();

    Mock::given(method("GET"))
        .and(header("user-agent", expected.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    for _ in 0..2 {
        let response = fetcher
            .fetch(&request(format!("{}/a", server.uri())), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }
    assert_eq!(fetcher.user_agent_for(&host), expected);
}

#[tokio::test]
async fn test_conditional_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let mut req = request(format!("{}/page", server.uri()));
    req.if_none_match = Some("\"v1\"".into());
    let response = fetcher().fetch(&req, &CancellationToken::new()).await.unwrap();
    assert!(response.is_not_modified());
}

#[tokio::test]
async fn test_rejects_non_http_scheme() {
    let result = fetcher()
        .fetch(&request("ftp://example.gov/x".into()), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
}
