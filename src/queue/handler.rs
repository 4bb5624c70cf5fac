// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::task::TaskKind;
use crate::domain::repositories::task_repository::CrawlTaskRepository;
use crate::utils::errors::PipelineError;

/// 处理器执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Done,
    /// 交给 Broker 退避重试
    Retry(PipelineError),
    /// 不再重试
    Fatal(PipelineError),
}

impl HandlerOutcome {
    /// 按错误类别映射：暂时性错误重试，其余终止
    pub fn from_result(result: Result<(), PipelineError>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Done,
            Err(err) if err.is_retryable() => HandlerOutcome::Retry(err),
            Err(err) => HandlerOutcome::Fatal(err),
        }
    }
}

/// 单次执行的上下文
///
/// 携带取消令牌与截止时间；处理器在每个挂起点通过 [`TaskContext::run`]
/// 或 [`TaskContext::checkpoint`] 观察取消。
pub struct TaskContext {
    pub task_id: Uuid,
    pub kind: TaskKind,
    /// 当前第几次执行（从 1 开始）
    pub attempt: u32,
    pub max_retries: u32,
    cancel: CancellationToken,
    deadline: Instant,
    tasks: Option<Arc<dyn CrawlTaskRepository>>,
    result: Mutex<Option<serde_json::Value>>,
}

impl TaskContext {
    pub fn new(
        task_id: Uuid,
        kind: TaskKind,
        attempt: u32,
        max_retries: u32,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            task_id,
            kind,
            attempt,
            max_retries,
            cancel,
            deadline: Instant::now() + timeout,
            tasks: None,
            result: Mutex::new(None),
        }
    }

    /// 不经过 Broker 直接调用处理器时使用
    pub fn detached(kind: TaskKind, timeout: Duration) -> Self {
        Self::new(Uuid::new_v4(), kind, 1, 0, CancellationToken::new(), timeout)
    }

    /// 挂上任务仓库以便写入进度
    pub fn with_task_repository(mut self, tasks: Arc<dyn CrawlTaskRepository>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// 同步检查点：已取消或已超时时返回错误
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(PipelineError::transient(format!(
                "任务执行超时: {}",
                self.kind
            )));
        }
        Ok(())
    }

    /// 在取消与截止时间约束下等待一个挂起点
    pub async fn run<F, T>(&self, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        self.checkpoint()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(PipelineError::transient(format!(
                "任务执行超时: {}",
                self.kind
            ))),
            result = fut => result,
        }
    }

    /// 更新进度；失败只记录告警
    pub async fn set_progress(&self, progress: f64) {
        if let Some(tasks) = &self.tasks {
            if let Err(e) = tasks.update_progress(self.task_id, progress).await {
                warn!(task_id = %self.task_id, "更新任务进度失败: {}", e);
            }
        }
    }

    /// 记录写入 `crawl_tasks.result` 的结果
    pub fn set_result(&self, value: serde_json::Value) {
        *self.result.lock() = Some(value);
    }

    pub fn take_result(&self) -> Option<serde_json::Value> {
        self.result.lock().take()
    }

    /// 连续相同失败的次数（含本次）
    ///
    /// 失败指纹保存在任务记录的 `result` 中，跨重试保留。
    pub async fn failure_streak(&self, fingerprint: &str) -> u32 {
        let Some(tasks) = &self.tasks else {
            return 1;
        };
        let mut task = match tasks.find_by_id(self.task_id).await {
            Ok(Some(task)) => task,
            _ => return 1,
        };

        let previous = task.result.as_ref().and_then(|r| {
            let fp = r.get("failure_fingerprint")?.as_str()?;
            let streak = r.get("failure_streak")?.as_u64()?;
            Some((fp.to_string(), streak as u32))
        });
        let streak = match previous {
            Some((fp, n)) if fp == fingerprint => n + 1,
            _ => 1,
        };

        task.result = Some(serde_json::json!({
            "failure_fingerprint": fingerprint,
            "failure_streak": streak,
        }));
        if let Err(e) = tasks.update(&task).await {
            warn!(task_id = %self.task_id, "记录失败指纹失败: {}", e);
        }
        streak
    }
}

/// 解析任务参数；格式错误不可重试
pub fn decode_payload<P: DeserializeOwned>(payload: &serde_json::Value) -> Result<P, PipelineError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| PipelineError::validation(format!("任务参数格式错误: {}", e)))
}

/// 任务处理器
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &TaskContext, payload: &serde_json::Value) -> HandlerOutcome;
}

/// 任务类型到处理器的映射
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(HandlerOutcome::from_result(Ok(())), HandlerOutcome::Done);
        assert!(matches!(
            HandlerOutcome::from_result(Err(PipelineError::transient("503"))),
            HandlerOutcome::Retry(_)
        ));
        assert!(matches!(
            HandlerOutcome::from_result(Err(PipelineError::validation("x"))),
            HandlerOutcome::Fatal(_)
        ));
        assert_eq!(
            HandlerOutcome::from_result(Err(PipelineError::Cancelled)),
            HandlerOutcome::Fatal(PipelineError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_run_returns_cancelled_when_token_fires() {
        let ctx = TaskContext::detached(TaskKind::ArticleFetch, Duration::from_secs(30));
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result: Result<(), _> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_times_out_as_transient() {
        let ctx = TaskContext::detached(TaskKind::ArticleFetch, Duration::from_millis(20));
        let result: Result<(), _> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(PipelineError::Transient(_))));
    }

    #[test]
    fn test_decode_payload_rejects_bad_shape() {
        #[derive(serde::Deserialize)]
        struct P {
            #[allow(dead_code)]
            announcement_id: i64,
        }
        assert!(decode_payload::<P>(&serde_json::json!({"announcement_id": 1})).is_ok());
        let err = decode_payload::<P>(&serde_json::json!({"x": 1})).err().unwrap();
        assert_eq!(err.class(), "validation");
    }
}
