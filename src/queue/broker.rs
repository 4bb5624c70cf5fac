// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{BrokerBackend, BrokerError, TaskEnvelope};
use super::handler::HandlerOutcome;
use crate::config::settings::BrokerSettings;
use crate::domain::models::crawl_log::{CrawlLog, LogLevel};
use crate::domain::models::task::{CrawlTask, QueueName, TaskKind, TaskStatus};
use crate::domain::repositories::crawl_log_repository::CrawlLogRepository;
use crate::domain::repositories::task_repository::CrawlTaskRepository;
use crate::utils::errors::PipelineError;
use crate::utils::retry_policy::RetryPolicy;

/// Broker 运行参数
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub weights: Vec<(QueueName, u32)>,
    pub retry_max: u32,
    pub retry_base: Duration,
    pub unique_ttl: Duration,
    pub task_timeout: Duration,
    pub poll_interval: Duration,
    pub lease: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            weights: vec![
                (QueueName::Critical, 6),
                (QueueName::Default, 3),
                (QueueName::Low, 1),
            ],
            retry_max: 3,
            retry_base: Duration::from_secs(30),
            unique_ttl: Duration::from_secs(86400),
            task_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            lease: Duration::from_secs(600),
        }
    }
}

impl From<&BrokerSettings> for BrokerConfig {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            weights: vec![
                (QueueName::Critical, settings.queue_weights.critical),
                (QueueName::Default, settings.queue_weights.default),
                (QueueName::Low, settings.queue_weights.low),
            ],
            retry_max: settings.retry_max,
            retry_base: Duration::from_secs(settings.retry_base_secs),
            unique_ttl: Duration::from_secs(settings.unique_ttl_secs),
            task_timeout: Duration::from_secs(settings.task_timeout_secs),
            poll_interval: settings.poll_interval(),
            lease: Duration::from_secs(settings.lease_secs),
        }
    }
}

/// 入队选项
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub queue: Option<QueueName>,
    pub delay: Option<Duration>,
    pub process_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub uniqueness_key: Option<String>,
    /// 唯一键窗口，缺省使用全局配置
    pub unique_ttl: Option<Duration>,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
}

impl EnqueueOptions {
    pub fn queue(mut self, queue: QueueName) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn process_at(mut self, at: DateTime<Utc>) -> Self {
        self.process_at = Some(at);
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn unique(mut self, key: impl Into<String>) -> Self {
        self.uniqueness_key = Some(key.into());
        self
    }

    pub fn unique_for(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.uniqueness_key = Some(key.into());
        self.unique_ttl = Some(ttl);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// 入队结果
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub queue: QueueName,
    pub state: TaskStatus,
    pub process_at: DateTime<Utc>,
    pub uniqueness_key: Option<String>,
}

/// 已被工作协程领取的任务
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub envelope: TaskEnvelope,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

/// 取消请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 尚未执行，已从队列移除
    Removed,
    /// 正在执行，已发出取消信号
    Signalled,
    /// 已处于终态
    AlreadyFinished,
}

/// 队列状态
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue: QueueName,
    pub depth: u64,
    pub in_flight: u64,
    pub failed_tail: Vec<FailedTaskSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedTaskSummary {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务 Broker
///
/// 后端保存待执行的信封，`crawl_tasks` 保存任务的生命周期；
/// 每次执行尝试在 `crawl_logs` 中追加一条记录。
pub struct Broker {
    backend: Arc<dyn BrokerBackend>,
    tasks: Arc<dyn CrawlTaskRepository>,
    logs: Arc<dyn CrawlLogRepository>,
    config: BrokerConfig,
    retry: RetryPolicy,
    running: DashMap<Uuid, CancellationToken>,
}

fn cancel_flag_key(task_id: Uuid) -> String {
    format!("cancel:{}", task_id)
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

impl Broker {
    pub fn new(
        backend: Arc<dyn BrokerBackend>,
        tasks: Arc<dyn CrawlTaskRepository>,
        logs: Arc<dyn CrawlLogRepository>,
        config: BrokerConfig,
    ) -> Self {
        let retry = RetryPolicy::linear(config.retry_max, config.retry_base);
        Self {
            backend,
            tasks,
            logs,
            config,
            retry,
            running: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn BrokerBackend> {
        self.backend.clone()
    }

    pub fn task_repository(&self) -> Arc<dyn CrawlTaskRepository> {
        self.tasks.clone()
    }

    /// 入队
    ///
    /// # 参数
    ///
    /// * `kind` - 任务类型
    /// * `payload` - 任务参数
    /// * `opts` - 队列、延迟、截止时间、唯一键等选项
    ///
    /// # 返回值
    ///
    /// * `Ok(TaskInfo)` - 入队成功
    /// * `Err(BrokerError::AlreadyQueued)` - 唯一键仍在窗口期内
    pub async fn enqueue(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<TaskInfo, BrokerError> {
        let queue = opts.queue.unwrap_or_else(|| kind.default_queue());
        let max_retries = opts.max_retries.unwrap_or(self.config.retry_max);
        let now = Utc::now();
        let process_at = match (opts.process_at, opts.delay) {
            (Some(at), _) => at,
            (None, Some(delay)) => now + chrono_duration(delay),
            (None, None) => now,
        };

        let mut task = CrawlTask::new(kind, payload, queue, max_retries as i32);
        task.uniqueness_key = opts.uniqueness_key.clone();
        task.scheduled_at = Some(process_at);
        task.deadline = opts.deadline;

        if let Some(key) = &opts.uniqueness_key {
            let ttl = opts.unique_ttl.unwrap_or(self.config.unique_ttl);
            if !self.backend.claim_unique(key, task.task_id, ttl).await? {
                metrics::counter!("gwycrawl_duplicates_total", "kind" => kind.as_str()).increment(1);
                return Err(BrokerError::AlreadyQueued(key.clone()));
            }
        }

        if let Err(e) = self.tasks.create(&task).await {
            if let Some(key) = &opts.uniqueness_key {
                self.backend.release_unique(key, task.task_id).await?;
            }
            return Err(e.into());
        }

        let timeout = opts.timeout.map(|t| t.as_secs());
        let envelope = TaskEnvelope::from_task(&task, timeout);
        if let Err(e) = self.backend.push(&envelope, process_at).await {
            // 记录没有队列条目，唯一键必须释放，否则调用方重试会被当作重复
            self.release_key(&task).await;
            task.status = TaskStatus::Failed;
            task.error_message = Some(format!("入队失败: {}", e));
            task.completed_at = Some(Utc::now());
            task.updated_at = Utc::now();
            if let Err(update_err) = self.tasks.update(&task).await {
                warn!(task_id = %task.task_id, "标记入队失败的任务记录失败: {}", update_err);
            }
            return Err(e);
        }

        metrics::counter!("gwycrawl_enqueued_total", "kind" => kind.as_str(), "queue" => queue.as_str())
            .increment(1);
        debug!(task_id = %task.task_id, kind = %kind, queue = %queue, "任务入队");

        Ok(TaskInfo {
            task_id: task.task_id,
            kind,
            queue,
            state: TaskStatus::Pending,
            process_at,
            uniqueness_key: opts.uniqueness_key,
        })
    }

    /// 以强类型参数入队
    pub async fn enqueue_payload<P: Serialize>(
        &self,
        kind: TaskKind,
        payload: &P,
        opts: EnqueueOptions,
    ) -> Result<TaskInfo, BrokerError> {
        self.enqueue(kind, serde_json::to_value(payload)?, opts).await
    }

    /// 按权重随机选择首个队列，其余队列按权重降序作为回退
    fn queue_order(&self) -> Vec<QueueName> {
        let mut weighted: Vec<(QueueName, u32)> = self
            .config
            .weights
            .iter()
            .copied()
            .filter(|(_, w)| *w > 0)
            .collect();
        if weighted.is_empty() {
            return QueueName::ALL.to_vec();
        }
        weighted.sort_by(|a, b| b.1.cmp(&a.1));

        let total: u32 = weighted.iter().map(|(_, w)| *w).sum();
        let mut pick = rand::random_range(0..total);
        let mut first = 0;
        for (i, (_, w)) in weighted.iter().enumerate() {
            if pick < *w {
                first = i;
                break;
            }
            pick -= *w;
        }

        let mut order = Vec::with_capacity(weighted.len());
        order.push(weighted[first].0);
        order.extend(
            weighted
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != first)
                .map(|(_, (q, _))| *q),
        );
        order
    }

    /// 领取一个就绪任务
    ///
    /// 已过截止时间的任务直接标记为失败；已取消的任务被跳过。
    pub async fn dequeue(&self) -> Result<Option<ClaimedTask>, BrokerError> {
        let now = Utc::now();
        for queue in self.queue_order() {
            while let Some(mut envelope) = self.backend.pop_ready(queue, now).await? {
                let Some(mut task) = self.tasks.find_by_id(envelope.task_id).await? else {
                    warn!(task_id = %envelope.task_id, "队列中的任务没有对应记录，已丢弃");
                    continue;
                };
                if task.status != TaskStatus::Pending {
                    debug!(task_id = %task.task_id, status = %task.status, "跳过非待执行任务");
                    continue;
                }

                if let Some(deadline) = task.deadline {
                    if deadline <= now {
                        task.fail("超过截止时间")?;
                        self.tasks.update(&task).await?;
                        self.release_key(&task).await;
                        info!(task_id = %task.task_id, "任务已过截止时间");
                        continue;
                    }
                }

                task.start()?;
                self.tasks.update(&task).await?;
                envelope.attempt = task.attempt_count.max(0) as u32;

                let cancel = CancellationToken::new();
                self.running.insert(task.task_id, cancel.clone());

                let timeout = envelope
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| task.task_type.default_timeout(self.config.task_timeout));

                return Ok(Some(ClaimedTask {
                    envelope,
                    cancel,
                    timeout,
                }));
            }
        }
        Ok(None)
    }

    /// 处理器返回后记录结果
    ///
    /// # 返回值
    ///
    /// 任务的新状态
    pub async fn finish(
        &self,
        claimed: &ClaimedTask,
        outcome: HandlerOutcome,
        result: Option<serde_json::Value>,
    ) -> Result<TaskStatus, BrokerError> {
        let task_id = claimed.envelope.task_id;
        self.running.remove(&task_id);

        let mut task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or(BrokerError::NotFound(task_id))?;
        let attempt = task.attempt_count;

        let outcome = match outcome {
            HandlerOutcome::Retry(_) | HandlerOutcome::Fatal(_)
                if claimed.cancel.is_cancelled() =>
            {
                HandlerOutcome::Fatal(PipelineError::Cancelled)
            }
            other => other,
        };

        let (level, message) = match &outcome {
            HandlerOutcome::Done => {
                task.complete(result)?;
                self.release_key(&task).await;
                (LogLevel::Info, "执行成功".to_string())
            }
            HandlerOutcome::Retry(err) if task.can_retry() => {
                let backoff = self.retry.calculate_backoff(attempt.max(1) as u32);
                let next = Utc::now() + chrono_duration(backoff);
                task.requeue(next, err.to_string())?;
                (
                    LogLevel::Warn,
                    format!("执行失败，{} 秒后重试: {}", backoff.as_secs(), err),
                )
            }
            HandlerOutcome::Retry(err) => {
                task.fail(err.to_string())?;
                self.release_key(&task).await;
                (LogLevel::Error, format!("重试次数耗尽: {}", err))
            }
            HandlerOutcome::Fatal(PipelineError::Cancelled) => {
                task.cancel()?;
                self.release_key(&task).await;
                (LogLevel::Warn, "任务已取消".to_string())
            }
            HandlerOutcome::Fatal(err) => {
                task.fail(err.to_string())?;
                self.release_key(&task).await;
                (LogLevel::Error, format!("执行失败: {}", err))
            }
        };

        self.tasks.update(&task).await?;

        if task.status == TaskStatus::Pending {
            let envelope = TaskEnvelope {
                attempt: task.attempt_count.max(0) as u32,
                ..claimed.envelope.clone()
            };
            let ready_at = task.scheduled_at.unwrap_or_else(Utc::now);
            self.backend.push(&envelope, ready_at).await?;
        }

        if let Err(e) = self
            .logs
            .append(&CrawlLog::attempt(task_id, attempt, level, message))
            .await
        {
            warn!(task_id = %task_id, "写入任务日志失败: {}", e);
        }

        metrics::counter!(
            "gwycrawl_tasks_total",
            "kind" => task.task_type.as_str(),
            "outcome" => task.status.as_str()
        )
        .increment(1);

        Ok(task.status)
    }

    async fn release_key(&self, task: &CrawlTask) {
        if let Some(key) = &task.uniqueness_key {
            if let Err(e) = self.backend.release_unique(key, task.task_id).await {
                warn!(task_id = %task.task_id, "释放唯一键失败: {}", e);
            }
        }
    }

    /// 取消任务
    ///
    /// 待执行任务直接移出队列；执行中的任务收到取消信号，
    /// 其他进程中的执行通过后端标记在下一个轮询周期内观察到。
    pub async fn cancel(&self, task_id: Uuid) -> Result<CancelOutcome, BrokerError> {
        let mut task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or(BrokerError::NotFound(task_id))?;

        match task.status {
            TaskStatus::Pending => {
                self.backend.remove(task.queue, task_id).await?;
                task.cancel()?;
                self.tasks.update(&task).await?;
                self.release_key(&task).await;
                let _ = self
                    .logs
                    .append(&CrawlLog::new(Some(task_id), LogLevel::Info, "任务在执行前被取消"))
                    .await;
                info!(task_id = %task_id, "已取消待执行任务");
                Ok(CancelOutcome::Removed)
            }
            TaskStatus::Running => {
                if let Some(token) = self.running.get(&task_id) {
                    token.cancel();
                }
                self.backend
                    .set_meta(&cancel_flag_key(task_id), "1", Some(self.config.lease))
                    .await?;
                info!(task_id = %task_id, "已向执行中的任务发出取消信号");
                Ok(CancelOutcome::Signalled)
            }
            _ => Ok(CancelOutcome::AlreadyFinished),
        }
    }

    /// 执行期间轮询跨进程取消标记，直到任务结束
    pub async fn watch_cancellation(&self, task_id: Uuid, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {}
            }
            if !self.running.contains_key(&task_id) {
                return;
            }
            match self.backend.get_meta(&cancel_flag_key(task_id)).await {
                Ok(Some(_)) => {
                    token.cancel();
                    return;
                }
                Ok(None) => {}
                Err(e) => debug!(task_id = %task_id, "读取取消标记失败: {}", e),
            }
        }
    }

    /// 队列状态
    pub async fn inspect(&self, queue: QueueName) -> Result<QueueStats, BrokerError> {
        let depth = self.backend.depth(queue).await?;
        let in_flight = self
            .tasks
            .count_by_status(queue, TaskStatus::Running)
            .await?;
        let failed_tail = self
            .tasks
            .failed_tail(queue, 10)
            .await?
            .into_iter()
            .map(|t| FailedTaskSummary {
                task_id: t.task_id,
                kind: t.task_type,
                error_message: t.error_message,
                completed_at: t.completed_at,
            })
            .collect();

        metrics::gauge!("gwycrawl_queue_depth", "queue" => queue.as_str()).set(depth as f64);

        Ok(QueueStats {
            queue,
            depth,
            in_flight,
            failed_tail,
        })
    }

    /// 所有队列的积压总数
    pub async fn total_depth(&self) -> Result<u64, BrokerError> {
        let mut total = 0;
        for queue in QueueName::ALL {
            total += self.backend.depth(queue).await?;
        }
        Ok(total)
    }

    /// 租约过期的运行中任务重新入队
    ///
    /// 本进程仍在执行的任务不受影响。
    pub async fn requeue_stuck(&self) -> Result<u64, BrokerError> {
        let started_before = Utc::now() - chrono_duration(self.config.lease);
        let stuck = self.tasks.find_stuck(started_before).await?;
        let mut count = 0;

        for mut task in stuck {
            if self.running.contains_key(&task.task_id) {
                continue;
            }
            let now = Utc::now();
            if task.can_retry() {
                task.requeue(now, "执行租约过期")?;
                self.tasks.update(&task).await?;
                self.backend
                    .push(&TaskEnvelope::from_task(&task, None), now)
                    .await?;
            } else {
                task.fail("执行租约过期且重试次数耗尽")?;
                self.tasks.update(&task).await?;
                self.release_key(&task).await;
            }
            let _ = self
                .logs
                .append(&CrawlLog::warn(Some(task.task_id), "执行租约过期"))
                .await;
            count += 1;
        }
        Ok(count)
    }

    /// 截止时间已过的待执行任务标记为失败
    pub async fn expire_overdue(&self) -> Result<u64, BrokerError> {
        Ok(self.tasks.expire_pending(Utc::now()).await?)
    }

    /// 本进程正在执行的任务数
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

#[cfg(test)]
#[path = "broker_test.rs"]
mod tests;
