// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::announcement::Announcement;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;

/// 公告仓库
#[async_trait]
pub trait AnnouncementRepository: Send + Sync {
    /// 在同一事务中写入公告与附件；URL 冲突返回 `AlreadyExists`
    async fn create(&self, announcement: &Announcement) -> Result<Announcement, RepositoryError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Announcement>, RepositoryError>;
    async fn find_by_url(&self, url: &str) -> Result<Option<Announcement>, RepositoryError>;
    /// 更新提取阶段产生的字段（类型、置信度、模板版本、partial 等）
    async fn update(&self, announcement: &Announcement) -> Result<Announcement, RepositoryError>;
    /// 标记附件已下载
    async fn mark_attachment_fetched(
        &self,
        attachment_id: i64,
        local_ref: Option<&str>,
    ) -> Result<(), RepositoryError>;
}
