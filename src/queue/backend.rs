// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::task::{CrawlTask, DomainError, QueueName, TaskKind};
use crate::utils::errors::{PipelineError, RepositoryError};

/// 队列错误类型
#[derive(Error, Debug)]
pub enum BrokerError {
    /// 唯一键仍在窗口期内
    #[error("任务已在队列中: {0}")]
    AlreadyQueued(String),

    #[error("任务不存在: {0}")]
    NotFound(Uuid),

    #[error("队列后端错误: {0}")]
    Backend(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("无效的 cron 表达式: {0}")]
    InvalidCron(String),

    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("状态错误: {0}")]
    State(#[from] DomainError),
}

impl From<BrokerError> for PipelineError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Backend(_) | BrokerError::Repository(_) => {
                PipelineError::Transient(err.to_string())
            }
            BrokerError::Serialization(_) => PipelineError::Validation(err.to_string()),
            BrokerError::AlreadyQueued(_)
            | BrokerError::NotFound(_)
            | BrokerError::InvalidCron(_)
            | BrokerError::State(_) => PipelineError::Permanent(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::Backend(err.to_string())
    }
}

/// 存放在后端中的任务信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub queue: QueueName,
    pub max_retries: u32,
    /// 已执行次数
    pub attempt: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub uniqueness_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// 由任务记录重建信封，用于重试与卡死任务恢复
    pub fn from_task(task: &CrawlTask, timeout_secs: Option<u64>) -> Self {
        Self {
            task_id: task.task_id,
            kind: task.task_type,
            payload: task.params.clone(),
            queue: task.queue,
            max_retries: task.max_retries.max(0) as u32,
            attempt: task.attempt_count.max(0) as u32,
            deadline: task.deadline,
            uniqueness_key: task.uniqueness_key.clone(),
            timeout_secs,
            enqueued_at: Utc::now(),
        }
    }
}

/// 队列存储后端
///
/// 每个队列是按就绪时间排序的集合；唯一键带过期时间；
/// `meta` 为简单键值，用于 cron 游标与跨进程取消标记。
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    /// 放入队列，`ready_at` 之前不可被取出
    async fn push(&self, envelope: &TaskEnvelope, ready_at: DateTime<Utc>)
        -> Result<(), BrokerError>;
    /// 原子地取出一个已就绪的任务
    async fn pop_ready(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEnvelope>, BrokerError>;
    /// 从队列中移除，返回是否存在
    async fn remove(&self, queue: QueueName, task_id: Uuid) -> Result<bool, BrokerError>;
    /// 队列中（含延迟）的任务数
    async fn depth(&self, queue: QueueName) -> Result<u64, BrokerError>;
    /// 占用唯一键；已被占用返回 false
    async fn claim_unique(
        &self,
        key: &str,
        task_id: Uuid,
        ttl: Duration,
    ) -> Result<bool, BrokerError>;
    /// 释放唯一键；仅当仍由 `task_id` 持有时生效
    async fn release_unique(&self, key: &str, task_id: Uuid) -> Result<(), BrokerError>;
    async fn get_meta(&self, key: &str) -> Result<Option<String>, BrokerError>;
    async fn set_meta(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), BrokerError>;
}
