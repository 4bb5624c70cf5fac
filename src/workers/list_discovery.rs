// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::context::CrawlerDeps;
use crate::domain::models::task::ListDiscoveryPayload;
use crate::queue::handler::decode_payload;
use crate::queue::{HandlerOutcome, TaskContext, TaskHandler};
use crate::utils::errors::PipelineError;

/// 列表页发现处理器（`crawler:list_discovery`）
pub struct ListDiscoveryHandler {
    deps: Arc<CrawlerDeps>,
}

impl ListDiscoveryHandler {
    pub fn new(deps: Arc<CrawlerDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: ListDiscoveryPayload = decode_payload(payload)?;
        if payload.aggregator_urls.is_empty() {
            return Err(PipelineError::validation("未提供聚合页 URL"));
        }
        let report = ctx
            .run(self.deps.discovery.discover(&payload, ctx.cancellation()))
            .await?;

        info!(
            links = report.links,
            created = report.created.len(),
            existing = report.existing,
            "列表页发现完成"
        );
        ctx.set_result(json!({
            "links": report.links,
            "created": report.created,
            "existing": report.existing,
        }));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for ListDiscoveryHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::list_page::{CrawlFrequency, ListPageStatus, NewListPage};
    use crate::domain::models::task::TaskKind;
    use crate::test_support::{self, memory_db, repositories, RecordingIndex};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HUB_HTML: &str = r#"<html><body>
        <a href="/zwgk/notice/12345.html">2025年考试录用公务员公告</a>
        <a href="/news/202503/abc.html">2025年事业单位公开招聘公告</a>
        <a href="/about.html">关于我们</a>
    </body></html>"#;

    fn context() -> TaskContext {
        TaskContext::detached(TaskKind::ListDiscovery, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_discovered_pages_created_paused() {
        // Given: 聚合页含两条公告链接，其中一个列表页已登记
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hub"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(HUB_HTML, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;
        let db = memory_db().await;
        let repos = repositories(&db);
        let known = format!("{}/news/", server.uri());
        repos.list_pages.create(&NewListPage::new(&known, "人社局")).await.unwrap();

        let deps = test_support::crawler_deps(
            &repos,
            test_support::broker(&repos),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let handler = ListDiscoveryHandler::new(Arc::new(deps));
        let payload = json!({ "aggregator_urls": [format!("{}/hub", server.uri())] });

        // When
        let ctx = context();
        assert_eq!(handler.handle(&ctx, &payload).await, HandlerOutcome::Done);

        // Then: 新列表页暂停待审核，已有列表页不重复创建
        let result = ctx.take_result().unwrap();
        assert_eq!(result["links"], 2);
        assert_eq!(result["existing"], 1);
        assert_eq!(result["created"].as_array().map(Vec::len), Some(1));

        let created = repos
            .list_pages
            .find_by_url(&format!("{}/zwgk/notice/", server.uri()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.status, ListPageStatus::Paused);
        assert_eq!(created.crawl_frequency, CrawlFrequency::Daily);
        let unchanged = repos.list_pages.find_by_url(&known).await.unwrap().unwrap();
        assert_eq!(unchanged.status, ListPageStatus::Active);
    }

    #[tokio::test]
    async fn test_empty_aggregator_list_rejected() {
        let db = memory_db().await;
        let repos = repositories(&db);
        let deps = test_support::crawler_deps(
            &repos,
            test_support::broker(&repos),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let handler = ListDiscoveryHandler::new(Arc::new(deps));

        let outcome = handler
            .handle(&context(), &json!({ "aggregator_urls": [] }))
            .await;
        assert!(matches!(outcome, HandlerOutcome::Fatal(PipelineError::Validation(_))));
    }
}
