// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::context::{enqueue_unique, CrawlerDeps};
use crate::domain::models::task::{ListMonitorPayload, QueueName, ScheduledMonitorPayload, TaskKind};
use crate::queue::handler::decode_payload;
use crate::queue::{EnqueueOptions, HandlerOutcome, TaskContext, TaskHandler};
use crate::utils::errors::PipelineError;

/// 定时监控处理器（`crawler:scheduled_monitor`）
///
/// 按频率挑出列表页并投递一个 `list_monitor`；同一周期内只投递一次。
pub struct ScheduledMonitorHandler {
    deps: Arc<CrawlerDeps>,
}

impl ScheduledMonitorHandler {
    pub fn new(deps: Arc<CrawlerDeps>) -> Self {
        Self { deps }
    }

    /// 积压最深的队列及其深度
    async fn deepest_queue(&self) -> Result<(QueueName, u64), PipelineError> {
        let mut deepest = (QueueName::Default, 0);
        for queue in QueueName::ALL {
            let stats = self.deps.broker.inspect(queue).await?;
            if stats.depth > deepest.1 {
                deepest = (queue, stats.depth);
            }
        }
        Ok(deepest)
    }

    async fn run(&self, ctx: &TaskContext, payload: &Value) -> Result<(), PipelineError> {
        let payload: ScheduledMonitorPayload = decode_payload(payload)?;
        let frequency = payload.frequency;

        let (queue, depth) = self.deepest_queue().await?;
        if depth > self.deps.backpressure_threshold {
            warn!(
                frequency = %frequency,
                queue = %queue,
                depth,
                threshold = self.deps.backpressure_threshold,
                "队列积压，跳过本轮定时监控"
            );
            self.deps
                .log_warn(
                    ctx.task_id,
                    format!("队列 {} 积压 {}，跳过 {} 监控", queue, depth, frequency),
                )
                .await;
            ctx.set_result(json!({ "skipped": "backpressure", "queue": queue.as_str(), "depth": depth }));
            return Ok(());
        }

        let ids: Vec<i64> = self
            .deps
            .list_pages
            .find_by_frequency(frequency)
            .await?
            .into_iter()
            .filter(|p| p.is_active())
            .map(|p| p.id)
            .collect();
        if ids.is_empty() {
            info!(frequency = %frequency, "没有该频率的列表页");
            ctx.set_result(json!({ "list_pages": 0 }));
            return Ok(());
        }

        let bucket = Utc::now().timestamp() as u64 / frequency.period_secs().max(1);
        let count = ids.len();
        let enqueued = enqueue_unique(
            &self.deps.broker,
            TaskKind::ListMonitor,
            &ListMonitorPayload { list_page_ids: ids },
            EnqueueOptions::default().unique(format!("scheduled:{}:{}", frequency, bucket)),
        )
        .await?;

        info!(frequency = %frequency, list_pages = count, enqueued, "定时监控已投递");
        ctx.set_result(json!({ "list_pages": count, "enqueued": enqueued }));
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for ScheduledMonitorHandler {
    async fn handle(&self, ctx: &TaskContext, payload: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.run(ctx, payload).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::list_page::{CrawlFrequency, ListPageStatus, NewListPage};
    use crate::test_support::{self, memory_db, repositories, RecordingIndex};
    use std::time::Duration;

    fn context() -> TaskContext {
        TaskContext::detached(TaskKind::ScheduledMonitor, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_active_pages_enqueued_once_per_period() {
        // Given: 两个每日活跃页、一个暂停页、一个每小时页
        let db = memory_db().await;
        let repos = repositories(&db);
        let broker = test_support::broker(&repos);
        for url in ["https://a.gov/list", "https://b.gov/list"] {
            repos.list_pages.create(&NewListPage::new(url, "人社局")).await.unwrap();
        }
        let paused = repos
            .list_pages
            .create(&NewListPage::new("https://c.gov/list", "人社局"))
            .await
            .unwrap();
        repos
            .list_pages
            .update_status(paused.id, ListPageStatus::Paused)
            .await
            .unwrap();
        let mut hourly = NewListPage::new("https://d.gov/list", "人社局");
        hourly.crawl_frequency = CrawlFrequency::Hourly;
        repos.list_pages.create(&hourly).await.unwrap();

        let deps = test_support::crawler_deps(
            &repos,
            broker.clone(),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let handler = ScheduledMonitorHandler::new(Arc::new(deps));
        let payload = json!({ "frequency": "daily" });

        // When: 同一周期内运行两次
        let first = context();
        assert_eq!(handler.handle(&first, &payload).await, HandlerOutcome::Done);
        let second = context();
        assert_eq!(handler.handle(&second, &payload).await, HandlerOutcome::Done);

        // Then
        let result = first.take_result().unwrap();
        assert_eq!(result["list_pages"], 2);
        assert_eq!(result["enqueued"], true);
        assert_eq!(second.take_result().unwrap()["enqueued"], false);
        assert_eq!(broker.inspect(QueueName::Default).await.unwrap().depth, 1);
    }

    #[tokio::test]
    async fn test_backpressure_skips_round() {
        // Given: 队列已有积压，阈值为 0
        let db = memory_db().await;
        let repos = repositories(&db);
        let broker = test_support::broker(&repos);
        repos
            .list_pages
            .create(&NewListPage::new("https://a.gov/list", "人社局"))
            .await
            .unwrap();
        broker
            .enqueue(TaskKind::ArticleFetch, json!({ "url": "https://a.gov/1.html" }), EnqueueOptions::default())
            .await
            .unwrap();
        let mut deps = test_support::crawler_deps(
            &repos,
            broker.clone(),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        deps.backpressure_threshold = 0;
        let handler = ScheduledMonitorHandler::new(Arc::new(deps));

        // When
        let ctx = context();
        let outcome = handler.handle(&ctx, &json!({ "frequency": "daily" })).await;

        // Then: 不投递新任务，只留下日志
        assert_eq!(outcome, HandlerOutcome::Done);
        assert_eq!(ctx.take_result().unwrap()["skipped"], "backpressure");
        assert_eq!(broker.total_depth().await.unwrap(), 1);
        assert_eq!(repos.logs.find_by_task(ctx.task_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_frequency_is_validation_error() {
        let db = memory_db().await;
        let repos = repositories(&db);
        let deps = test_support::crawler_deps(
            &repos,
            test_support::broker(&repos),
            test_support::fetch_limits(),
            Arc::new(RecordingIndex::default()),
        );
        let handler = ScheduledMonitorHandler::new(Arc::new(deps));

        let outcome = handler.handle(&context(), &json!({ "frequency": "monthly" })).await;
        assert!(matches!(outcome, HandlerOutcome::Fatal(PipelineError::Validation(_))));
    }
}
