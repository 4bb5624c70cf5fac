// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{announcement_exists, article_html, create_test_app, task_attempts, url};
use gwycrawl::domain::models::task::{ArticleFetchPayload, TaskKind};
use gwycrawl::queue::EnqueueOptions;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetch_payload(server: &MockServer, path: &str) -> ArticleFetchPayload {
    ArticleFetchPayload {
        url: url(server, path),
        title: "第1批公务员招录公告".to_string(),
        source_list_id: 1,
        source_name: "某省人社厅".to_string(),
        category: "省考".to_string(),
    }
}

#[tokio::test]
async fn test_retry_then_succeed() {
    // Given: 文章前两次返回 503，第三次成功
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/art/1.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/art/1.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(article_html(1), "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    let app = create_test_app().await;

    // When
    let info = app
        .broker
        .enqueue_payload(
            TaskKind::ArticleFetch,
            &fetch_payload(&server, "/art/1.html"),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    app.wait_idle(Duration::from_secs(15)).await;

    // Then: 共执行三次，最终完成，只有一条公告
    let (attempts, status) = task_attempts(&app, info.task_id).await;
    assert_eq!(attempts, 3);
    assert_eq!(status, "completed");
    assert!(announcement_exists(&app, &url(&server, "/art/1.html")).await);

    app.shutdown().await;
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    // Given: 文章地址 404
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/art/404.html"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let app = create_test_app().await;

    // When
    let info = app
        .broker
        .enqueue_payload(
            TaskKind::ArticleFetch,
            &fetch_payload(&server, "/art/404.html"),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    app.wait_idle(Duration::from_secs(15)).await;

    // Then: 永久错误直接失败
    let (attempts, status) = task_attempts(&app, info.task_id).await;
    assert_eq!(attempts, 1);
    assert_eq!(status, "failed");
    assert!(!announcement_exists(&app, &url(&server, "/art/404.html")).await);

    app.shutdown().await;
    server.verify().await;
}
