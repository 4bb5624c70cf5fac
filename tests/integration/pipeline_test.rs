// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    announcement_exists, article_html, create_test_app, list_html, list_page_article_count, url,
};
use gwycrawl::domain::models::list_page::NewListPage;
use gwycrawl::domain::models::task::{ListMonitorPayload, TaskKind};
use gwycrawl::domain::repositories::list_page_repository::ListPageRepository;
use gwycrawl::queue::EnqueueOptions;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(body, "text/html; charset=utf-8")
}

async fn mount_articles(server: &MockServer, count: usize) {
    for n in 1..=count {
        Mock::given(method("GET"))
            .and(path(format!("/art/{}.html", n)))
            .respond_with(html(article_html(n)))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_fresh_list_page_then_remonitor() {
    // Given: 列表页第一次返回 3 篇，之后返回 5 篇
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channel/100"))
        .respond_with(html(list_html(3)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channel/100"))
        .respond_with(html(list_html(5)))
        .mount(&server)
        .await;
    mount_articles(&server, 5).await;

    let app = create_test_app().await;
    let mut new_page = NewListPage::new(url(&server, "/channel/100"), "某省人社厅");
    new_page.article_selector = Some("li.item a".into());
    let page = app.list_pages.create(&new_page).await.unwrap();
    let payload = ListMonitorPayload {
        list_page_ids: vec![page.id],
    };

    // When: 第一次监控
    app.broker
        .enqueue_payload(TaskKind::ListMonitor, &payload, EnqueueOptions::default())
        .await
        .unwrap();
    app.wait_idle(Duration::from_secs(15)).await;

    // Then: 3 篇公告入库
    for n in 1..=3 {
        assert!(announcement_exists(&app, &url(&server, &format!("/art/{}.html", n))).await);
    }
    assert!(!announcement_exists(&app, &url(&server, "/art/4.html")).await);
    assert_eq!(list_page_article_count(&app, page.id).await, 3);

    // When: 再次监控，列表多出两篇
    app.broker
        .enqueue_payload(TaskKind::ListMonitor, &payload, EnqueueOptions::default())
        .await
        .unwrap();
    app.wait_idle(Duration::from_secs(15)).await;

    // Then: 只抓取新增的两篇，旧文章不重复抓取（由 expect(1) 校验）
    for n in 1..=5 {
        assert!(announcement_exists(&app, &url(&server, &format!("/art/{}.html", n))).await);
    }
    assert_eq!(list_page_article_count(&app, page.id).await, 5);

    app.shutdown().await;
    server.verify().await;
}
