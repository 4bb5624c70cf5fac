// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{CrawlTask, QueueName, TaskStatus};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 任务仓库特质
///
/// 定义 `crawl_tasks` 的数据访问接口
#[async_trait]
pub trait CrawlTaskRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, task_id: Uuid) -> Result<Option<CrawlTask>, RepositoryError>;
    /// 更新任务
    async fn update(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError>;
    /// 仅更新进度
    async fn update_progress(&self, task_id: Uuid, progress: f64) -> Result<(), RepositoryError>;
    /// 查找开始时间早于 `started_before` 仍处于运行中的任务
    async fn find_stuck(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CrawlTask>, RepositoryError>;
    /// 将截止时间已过的待执行任务标记为失败
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
    /// 统计某队列处于某状态的任务数
    async fn count_by_status(
        &self,
        queue: QueueName,
        status: TaskStatus,
    ) -> Result<u64, RepositoryError>;
    /// 最近失败的任务
    async fn failed_tail(
        &self,
        queue: QueueName,
        limit: u64,
    ) -> Result<Vec<CrawlTask>, RepositoryError>;
}
