// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_app, create_test_app_no_worker};
use axum_test::TestServer;
use gwycrawl::domain::models::task::TaskKind;
use gwycrawl::presentation::routes;
use gwycrawl::queue::EnqueueOptions;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::time::Duration;

fn server(app: &super::helpers::TestApp) -> TestServer {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    TestServer::new(routes::routes(app.broker.clone(), handle)).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app_no_worker().await;
    let server = server(&app);

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_queue_inspection_counts_pending_by_queue() {
    // Given: 低优先级队列有两个待处理任务
    let app = create_test_app_no_worker().await;
    for _ in 0..2 {
        app.broker
            .enqueue(
                TaskKind::ListDiscovery,
                json!({ "aggregator_urls": ["https://example.gov/links.html"] }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
    }
    let server = server(&app);

    // When
    let low: Value = server.get("/internal/queues/low").await.json();
    let critical: Value = server.get("/internal/queues/critical").await.json();

    // Then
    assert_eq!(low["queue"], "low");
    assert_eq!(low["depth"], 2);
    assert_eq!(critical["depth"], 0);
}

#[tokio::test]
async fn test_failed_task_appears_in_failed_tail() {
    // Given: 一个地址非法的抓取任务
    let app = create_test_app().await;
    let info = app
        .broker
        .enqueue(
            TaskKind::ArticleFetch,
            json!({ "url": "not a url", "source_list_id": 1 }),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    app.wait_idle(Duration::from_secs(10)).await;
    let server = server(&app);

    // When
    let response = server.get("/internal/queues/default").await;

    // Then: 校验错误直接失败，出现在失败列表中
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["depth"], 0);
    let tail = body["failed_tail"].as_array().unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0]["task_id"], info.task_id.to_string());
    assert_eq!(tail[0]["kind"], "crawler:announcement");

    app.shutdown().await;
}
