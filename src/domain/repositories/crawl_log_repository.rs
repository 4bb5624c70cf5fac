// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crawl_log::CrawlLog;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait CrawlLogRepository: Send + Sync {
    async fn append(&self, log: &CrawlLog) -> Result<CrawlLog, RepositoryError>;
    /// 按时间倒序返回任务最近的日志
    async fn find_by_task(&self, task_id: Uuid, limit: u64)
        -> Result<Vec<CrawlLog>, RepositoryError>;
}
