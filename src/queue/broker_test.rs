// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::repositories::crawl_log_repository::CrawlLogRepository;
use crate::queue::memory_backend::MemoryBackend;
use crate::test_support::{memory_db, repositories};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};

async fn setup() -> (Broker, Arc<dyn CrawlTaskRepository>, Arc<dyn CrawlLogRepository>) {
    let db = memory_db().await;
    let repos = repositories(&db);
    let config = BrokerConfig {
        retry_base: Duration::from_millis(0),
        poll_interval: Duration::from_millis(20),
        ..BrokerConfig::default()
    };
    let broker = Broker::new(
        Arc::new(MemoryBackend::new()),
        repos.tasks.clone(),
        repos.logs.clone(),
        config,
    );
    (broker, repos.tasks, repos.logs)
}

#[tokio::test]
async fn test_enqueue_then_dequeue_marks_running() {
    let (broker, tasks, _) = setup().await;

    let info = broker
        .enqueue(TaskKind::ArticleFetch, json!({"url": "https://a.gov.cn/1"}), EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(info.queue, QueueName::Default);

    let claimed = broker.dequeue().await.unwrap().unwrap();
    assert_eq!(claimed.envelope.task_id, info.task_id);
    assert_eq!(claimed.envelope.attempt, 1);

    let task = tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(broker.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_uniqueness_key_rejects_duplicate() {
    let (broker, _, _) = setup().await;
    let opts = EnqueueOptions::default().unique("positions:42");

    broker
        .enqueue(TaskKind::PositionExtract, json!({"announcement_id": 42}), opts.clone())
        .await
        .unwrap();
    let second = broker
        .enqueue(TaskKind::PositionExtract, json!({"announcement_id": 42}), opts)
        .await;

    assert!(matches!(second, Err(BrokerError::AlreadyQueued(_))));
}

#[tokio::test]
async fn test_delayed_task_not_visible_before_ready() {
    let (broker, _, _) = setup().await;
    broker
        .enqueue(
            TaskKind::CalendarReminder,
            json!({}),
            EnqueueOptions::default().delay(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

    assert!(broker.dequeue().await.unwrap().is_none());
    let stats = broker.inspect(QueueName::Critical).await.unwrap();
    assert_eq!(stats.depth, 1);
}

#[tokio::test]
async fn test_retry_runs_max_retries_plus_one_attempts() {
    // Given: 最大重试 2 次、处理器始终返回暂时性错误
    let (broker, tasks, logs) = setup().await;
    let info = broker
        .enqueue(
            TaskKind::ArticleFetch,
            json!({}),
            EnqueueOptions::default().max_retries(2),
        )
        .await
        .unwrap();

    // When: 反复领取并报告失败
    let mut attempts = 0;
    let mut last_status = TaskStatus::Pending;
    while let Some(claimed) = broker.dequeue().await.unwrap() {
        attempts += 1;
        last_status = broker
            .finish(&claimed, HandlerOutcome::Retry(PipelineError::transient("503")), None)
            .await
            .unwrap();
    }

    // Then: 共执行 3 次，最终失败，并有 3 条执行记录
    assert_eq!(attempts, 3);
    assert_eq!(last_status, TaskStatus::Failed);
    let task = tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let attempt_rows: Vec<_> = logs
        .find_by_task(info.task_id, 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.attempt.is_some())
        .collect();
    assert_eq!(attempt_rows.len(), 3);
}

#[tokio::test]
async fn test_fatal_outcome_fails_without_retry() {
    let (broker, _, _) = setup().await;
    broker
        .enqueue(TaskKind::ArticleFetch, json!({}), EnqueueOptions::default())
        .await
        .unwrap();

    let claimed = broker.dequeue().await.unwrap().unwrap();
    let status = broker
        .finish(&claimed, HandlerOutcome::Fatal(PipelineError::permanent("404")), None)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Failed);
    assert!(broker.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_pending_task_is_never_run() {
    let (broker, tasks, _) = setup().await;
    let info = broker
        .enqueue(TaskKind::DailyCheck, json!({}), EnqueueOptions::default())
        .await
        .unwrap();

    assert_eq!(broker.cancel(info.task_id).await.unwrap(), CancelOutcome::Removed);
    assert!(broker.dequeue().await.unwrap().is_none());
    let task = tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_running_task_signals_token() {
    let (broker, tasks, _) = setup().await;
    let info = broker
        .enqueue(TaskKind::ListMonitor, json!({}), EnqueueOptions::default())
        .await
        .unwrap();
    let claimed = broker.dequeue().await.unwrap().unwrap();

    assert_eq!(broker.cancel(info.task_id).await.unwrap(), CancelOutcome::Signalled);
    assert!(claimed.cancel.is_cancelled());

    let status = broker
        .finish(&claimed, HandlerOutcome::Fatal(PipelineError::Cancelled), None)
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Cancelled);
    let task = tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_releases_uniqueness_key() {
    let (broker, _, _) = setup().await;
    let opts = EnqueueOptions::default().unique("monitor:daily");
    let info = broker
        .enqueue(TaskKind::ScheduledMonitor, json!({"frequency": "daily"}), opts.clone())
        .await
        .unwrap();

    broker.cancel(info.task_id).await.unwrap();
    assert!(broker
        .enqueue(TaskKind::ScheduledMonitor, json!({"frequency": "daily"}), opts)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_expired_deadline_is_failed_on_dequeue() {
    let (broker, tasks, _) = setup().await;
    let info = broker
        .enqueue(
            TaskKind::ArticleFetch,
            json!({}),
            EnqueueOptions::default().deadline(Utc::now() - chrono::Duration::seconds(1)),
        )
        .await
        .unwrap();

    assert!(broker.dequeue().await.unwrap().is_none());
    let task = tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_done_records_result() {
    let (broker, tasks, _) = setup().await;
    let info = broker
        .enqueue(TaskKind::ListMonitor, json!({}), EnqueueOptions::default())
        .await
        .unwrap();

    let claimed = broker.dequeue().await.unwrap().unwrap();
    broker
        .finish(&claimed, HandlerOutcome::Done, Some(json!({"articles": 3})))
        .await
        .unwrap();

    let task = tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(json!({"articles": 3})));
    assert_eq!(task.progress, 1.0);
}

#[tokio::test]
async fn test_queue_order_covers_all_weighted_queues() {
    let (broker, _, _) = setup().await;
    let mut critical_first = 0;
    for _ in 0..200 {
        let order = broker.queue_order();
        assert_eq!(order.len(), 3);
        if order[0] == QueueName::Critical {
            critical_first += 1;
        }
    }
    // 权重 6/3/1，critical 约六成时间排在最前
    assert!(critical_first > 80);
}

/// 首次 push 失败的后端
struct FlakyPushBackend {
    inner: MemoryBackend,
    failures: AtomicU32,
}

#[async_trait::async_trait]
impl BrokerBackend for FlakyPushBackend {
    async fn push(&self, envelope: &TaskEnvelope, ready_at: DateTime<Utc>) -> Result<(), BrokerError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrokerError::Backend("connection reset".into()));
        }
        self.inner.push(envelope, ready_at).await
    }
    async fn pop_ready(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Option<TaskEnvelope>, BrokerError> {
        self.inner.pop_ready(queue, now).await
    }
    async fn remove(&self, queue: QueueName, task_id: Uuid) -> Result<bool, BrokerError> {
        self.inner.remove(queue, task_id).await
    }
    async fn depth(&self, queue: QueueName) -> Result<u64, BrokerError> {
        self.inner.depth(queue).await
    }
    async fn claim_unique(&self, key: &str, task_id: Uuid, ttl: Duration) -> Result<bool, BrokerError> {
        self.inner.claim_unique(key, task_id, ttl).await
    }
    async fn release_unique(&self, key: &str, task_id: Uuid) -> Result<(), BrokerError> {
        self.inner.release_unique(key, task_id).await
    }
    async fn get_meta(&self, key: &str) -> Result<Option<String>, BrokerError> {
        self.inner.get_meta(key).await
    }
    async fn set_meta(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), BrokerError> {
        self.inner.set_meta(key, value, ttl).await
    }
}

#[tokio::test]
async fn test_failed_push_releases_key_for_retry() {
    // Given: 首次 push 失败的后端
    let db = memory_db().await;
    let repos = repositories(&db);
    let broker = Broker::new(
        Arc::new(FlakyPushBackend {
            inner: MemoryBackend::new(),
            failures: AtomicU32::new(1),
        }),
        repos.tasks.clone(),
        repos.logs.clone(),
        BrokerConfig::default(),
    );
    let opts = EnqueueOptions::default().unique("k1");

    // When: 同一唯一键入队两次
    let first = broker
        .enqueue(TaskKind::ArticleFetch, json!({"url": "https://a.gov.cn/1"}), opts.clone())
        .await;
    let second = broker
        .enqueue(TaskKind::ArticleFetch, json!({"url": "https://a.gov.cn/1"}), opts)
        .await;

    // Then: 第二次成功，首次的记录标记为失败
    assert!(matches!(first, Err(BrokerError::Backend(_))));
    let info = second.unwrap();
    assert_eq!(broker.inspect(QueueName::Default).await.unwrap().depth, 1);
    let failed = repos
        .tasks
        .count_by_status(QueueName::Default, TaskStatus::Failed)
        .await
        .unwrap();
    assert_eq!(failed, 1);
    let task = repos.tasks.find_by_id(info.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}
