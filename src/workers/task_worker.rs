// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::worker::Worker;
use crate::domain::models::task::TaskStatus;
use crate::queue::{Broker, ClaimedTask, HandlerOutcome, HandlerTable, TaskContext};
use crate::utils::errors::{PipelineError, WorkerError};

/// 任务工作器
///
/// 循环领取任务并交给处理器表中对应的处理器执行。
pub struct TaskWorker {
    broker: Arc<Broker>,
    handlers: HandlerTable,
    worker_id: Uuid,
}

impl TaskWorker {
    /// 创建新的任务工作器实例
    pub fn new(broker: Arc<Broker>, handlers: HandlerTable) -> Self {
        Self {
            broker,
            handlers,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 领取并执行一个任务
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(status))` - 执行了一个任务及其最终状态
    /// * `Ok(None)` - 当前没有就绪任务
    pub async fn process_next(&self) -> Result<Option<TaskStatus>, WorkerError> {
        let claimed = self
            .broker
            .dequeue()
            .await
            .map_err(|e| WorkerError::BrokerError(e.to_string()))?;
        let Some(claimed) = claimed else {
            return Ok(None);
        };
        let status = self.process_task(claimed).await?;
        Ok(Some(status))
    }

    #[instrument(
        skip(self, claimed),
        fields(
            worker_id = %self.worker_id,
            task_id = %claimed.envelope.task_id,
            kind = %claimed.envelope.kind,
            attempt = claimed.envelope.attempt
        )
    )]
    async fn process_task(&self, claimed: ClaimedTask) -> Result<TaskStatus, WorkerError> {
        let envelope = &claimed.envelope;
        let ctx = TaskContext::new(
            envelope.task_id,
            envelope.kind,
            envelope.attempt.max(1),
            envelope.max_retries,
            claimed.cancel.clone(),
            claimed.timeout,
        )
        .with_task_repository(self.broker.task_repository());

        let watcher = {
            let broker = self.broker.clone();
            let token = claimed.cancel.clone();
            let task_id = envelope.task_id;
            tokio::spawn(
                async move { broker.watch_cancellation(task_id, token).await }.in_current_span(),
            )
        };

        let started = Instant::now();
        let outcome = match self.handlers.get(envelope.kind) {
            Some(handler) => handler.handle(&ctx, &envelope.payload).await,
            None => {
                warn!("没有注册处理器");
                HandlerOutcome::Fatal(PipelineError::permanent(format!(
                    "未注册的任务类型: {}",
                    envelope.kind
                )))
            }
        };
        let elapsed = started.elapsed();
        watcher.abort();

        let outcome_label = match &outcome {
            HandlerOutcome::Done => "done",
            HandlerOutcome::Retry(_) => "retry",
            HandlerOutcome::Fatal(_) => "fatal",
        };
        metrics::histogram!(
            "gwycrawl_task_duration_seconds",
            "kind" => envelope.kind.as_str(),
            "outcome" => outcome_label
        )
        .record(elapsed.as_secs_f64());

        let status = self
            .broker
            .finish(&claimed, outcome, ctx.take_result())
            .await
            .map_err(|e| WorkerError::BrokerError(e.to_string()))?;
        info!(
            status = status.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "任务执行结束"
        );
        Ok(status)
    }
}

#[async_trait]
impl Worker for TaskWorker {
    async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        let idle = self.broker.config().poll_interval;
        info!("Task worker {} started", self.worker_id);

        while !shutdown.is_cancelled() {
            let wait = match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => idle,
                Err(e) => {
                    error!("Error processing task: {}", e);
                    idle
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }

        info!("Task worker {} stopped", self.worker_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "task_worker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskKind;
    use crate::queue::memory_backend::MemoryBackend;
    use crate::queue::{BrokerConfig, EnqueueOptions, TaskHandler};
    use crate::test_support::{memory_db, repositories};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// 前 n 次返回暂时性错误，之后成功
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for Flaky {
        async fn handle(&self, ctx: &TaskContext, _payload: &Value) -> HandlerOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return HandlerOutcome::Retry(PipelineError::transient("503"));
            }
            ctx.set_result(json!({ "call": call }));
            HandlerOutcome::Done
        }
    }

    async fn broker() -> Arc<Broker> {
        let repos = repositories(&memory_db().await);
        let config = BrokerConfig {
            retry_base: Duration::from_millis(0),
            ..BrokerConfig::default()
        };
        Arc::new(Broker::new(
            Arc::new(MemoryBackend::new()),
            repos.tasks.clone(),
            repos.logs.clone(),
            config,
        ))
    }

    #[tokio::test]
    async fn test_retries_until_done() {
        // Given: 失败一次后成功的处理器
        let broker = broker().await;
        let mut handlers = HandlerTable::new();
        handlers.register(
            TaskKind::ArticleFetch,
            Arc::new(Flaky {
                failures: 1,
                calls: AtomicU32::new(0),
            }),
        );
        let worker = TaskWorker::new(broker.clone(), handlers);
        let info = broker
            .enqueue(TaskKind::ArticleFetch, json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        // When
        let first = worker.process_next().await.unwrap();
        let second = worker.process_next().await.unwrap();

        // Then: 第一次回到 pending，第二次完成并写入结果
        assert_eq!(first, Some(TaskStatus::Pending));
        assert_eq!(second, Some(TaskStatus::Completed));
        let task = broker
            .task_repository()
            .find_by_id(info.task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.attempt_count, 2);
        assert_eq!(task.result, Some(json!({ "call": 2 })));
    }

    #[tokio::test]
    async fn test_unregistered_kind_fails() {
        let broker = broker().await;
        let worker = TaskWorker::new(broker.clone(), HandlerTable::new());
        broker
            .enqueue(TaskKind::DailyCheck, json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let status = worker.process_next().await.unwrap();
        assert_eq!(status, Some(TaskStatus::Failed));
        assert_eq!(worker.process_next().await.unwrap(), None);
    }
}
